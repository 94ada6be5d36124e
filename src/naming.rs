//! Naming conventions
//!
//! Bean names are derived from the simple type name; table and column names
//! are derived by converting identifiers to snake_case.

/// Strip module paths, generic arguments and a leading `dyn ` from a
/// `std::any::type_name` string.
///
/// ```rust
/// use sprout_ioc::naming::simple_type_name;
///
/// assert_eq!(simple_type_name("app::service::UserService"), "UserService");
/// assert_eq!(simple_type_name("dyn app::repo::UserRepository"), "UserRepository");
/// assert_eq!(simple_type_name("app::Wrapper<app::Inner>"), "Wrapper");
/// ```
pub fn simple_type_name(type_name: &str) -> &str {
    let name = type_name.trim_start_matches("dyn ");
    let name = match name.find('<') {
        Some(idx) => &name[..idx],
        None => name,
    };
    let name = name.split(" + ").next().unwrap_or(name);
    match name.rfind("::") {
        Some(idx) => &name[idx + 2..],
        None => name,
    }
}

/// Decide the bean name for a type.
///
/// An explicit name wins. Otherwise the simple type name is decapitalized.
pub fn bean_name(explicit: Option<&str>, type_name: &str) -> String {
    match explicit {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => decapitalize(simple_type_name(type_name)),
    }
}

/// Lower-case the first character unless the first two are both upper-case
/// (`URLParser` stays `URLParser`, `UserService` becomes `userService`).
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    if let Some(second) = name.chars().nth(1) {
        if first.is_uppercase() && second.is_uppercase() {
            return name.to_string();
        }
    }
    first.to_lowercase().chain(chars).collect()
}

/// Convert a camelCase or PascalCase identifier to snake_case.
///
/// Every upper-case character becomes `_` plus its lower-case form, except
/// at the start of the string. Identifiers already in snake_case are
/// returned unchanged.
pub fn to_snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, c) in ident.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
