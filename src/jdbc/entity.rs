//! Entities and row mapping

use super::value::{FromSqlValue, Row, SqlValue};
use crate::naming;
use crate::{IocError, Result};

#[cfg(feature = "logging")]
use tracing::trace;

/// A plain data type stored in one table.
///
/// Usually implemented with `#[derive(Entity)]`:
///
/// ```rust,ignore
/// #[derive(Debug, Default, Entity)]
/// #[entity(table = "users")]
/// struct User {
///     id: i64,
///     user_name: String,
/// }
/// ```
pub trait Entity: Default + Send + Sync + 'static {
    /// Simple type name, used to derive the table name
    fn entity_name() -> &'static str {
        naming::simple_type_name(std::any::type_name::<Self>())
    }

    /// Explicit table name, if the type carries one
    fn table_name() -> Option<&'static str> {
        None
    }

    /// Field names in declaration order
    fn fields() -> &'static [&'static str];

    /// Current value of `field`, `None` for unknown fields
    fn field_value(&self, field: &str) -> Option<SqlValue>;

    /// Assign `value` to `field`; unknown fields are ignored
    fn set_field(&mut self, field: &str, value: SqlValue) -> Result<()>;
}

/// The table an entity lives in: the explicit name, else the snake_case
/// form of the simple type name.
pub fn table_of<E: Entity>() -> String {
    match E::table_name() {
        Some(table) => table.to_string(),
        None => naming::to_snake_case(E::entity_name()),
    }
}

/// The column a field is stored in.
#[inline]
pub fn column_of(field: &str) -> String {
    naming::to_snake_case(field)
}

/// Convert `value` for `field` of entity `E`, reporting failures as
/// [`IocError::EntityMappingFailed`]. Used by `#[derive(Entity)]`.
pub fn convert<E: Entity, T: FromSqlValue>(field: &str, value: SqlValue) -> Result<T> {
    T::from_sql_value(value).map_err(|err| IocError::EntityMappingFailed {
        entity: E::entity_name(),
        column: column_of(field),
        reason: err.to_string(),
    })
}

/// Build an entity from a result row.
///
/// For each declared field the snake_case column is read; missing columns
/// and NULL values leave the field at its default.
pub fn map_row<E: Entity>(row: &Row) -> Result<E> {
    let mut entity = E::default();
    for field in E::fields() {
        let column = column_of(field);
        match row.get(&column) {
            None => {
                #[cfg(feature = "logging")]
                trace!(
                    target: "sprout_ioc::sql",
                    entity = E::entity_name(),
                    column = %column,
                    "Column absent from result; field left at default"
                );
            }
            Some(value) if value.is_null() => {}
            Some(value) => entity.set_field(field, value.clone())?,
        }
    }
    Ok(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct UserAccount {
        id: i64,
        display_name: String,
        score: Option<i32>,
    }

    impl Entity for UserAccount {
        fn fields() -> &'static [&'static str] {
            &["id", "displayName", "score"]
        }

        fn field_value(&self, field: &str) -> Option<SqlValue> {
            match field {
                "id" => Some(self.id.into()),
                "displayName" => Some(self.display_name.clone().into()),
                "score" => Some(self.score.into()),
                _ => None,
            }
        }

        fn set_field(&mut self, field: &str, value: SqlValue) -> Result<()> {
            match field {
                "id" => self.id = convert::<Self, _>(field, value)?,
                "displayName" => self.display_name = convert::<Self, _>(field, value)?,
                "score" => self.score = convert::<Self, _>(field, value)?,
                _ => {}
            }
            Ok(())
        }
    }

    fn row(pairs: &[(&str, SqlValue)]) -> Row {
        Row::new(
            pairs.iter().map(|(c, _)| c.to_string()).collect(),
            pairs.iter().map(|(_, v)| v.clone()).collect(),
        )
    }

    #[test]
    fn test_table_name_is_derived() {
        assert_eq!(table_of::<UserAccount>(), "user_account");
    }

    #[test]
    fn test_map_row_uses_snake_case_columns() {
        let mapped: UserAccount = map_row(&row(&[
            ("id", SqlValue::Integer(9)),
            ("display_name", SqlValue::from("Ada")),
            ("score", SqlValue::Integer(3)),
        ]))
        .unwrap();

        assert_eq!(
            mapped,
            UserAccount {
                id: 9,
                display_name: "Ada".into(),
                score: Some(3),
            }
        );
    }

    #[test]
    fn test_missing_and_null_columns_are_skipped() {
        let mapped: UserAccount = map_row(&row(&[
            ("id", SqlValue::Integer(1)),
            ("score", SqlValue::Null),
        ]))
        .unwrap();

        assert_eq!(mapped.id, 1);
        assert_eq!(mapped.display_name, "");
        assert_eq!(mapped.score, None);
    }

    #[test]
    fn test_conversion_failure_names_the_column() {
        let err = map_row::<UserAccount>(&row(&[("display_name", SqlValue::Integer(5))]))
            .unwrap_err();
        match err {
            IocError::EntityMappingFailed { entity, column, .. } => {
                assert_eq!(entity, "UserAccount");
                assert_eq!(column, "display_name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
