//! Provider traits for dependency injection
//!
//! These traits define what can be injected and how constructor parameter
//! lists are resolved from the container.

use crate::{Container, IocError, Result};
use std::any::TypeId;
use std::sync::Arc;

/// Marker trait for anything the container can hand out.
///
/// Automatically implemented for every `Send + Sync + 'static` type,
/// including trait objects such as `dyn UserRepository` whose trait has
/// `Send + Sync` supertraits.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the TypeId of this type (for internal use)
    #[inline]
    fn type_id_of() -> TypeId
    where
        Self: Sized,
    {
        TypeId::of::<Self>()
    }

    /// Returns the type name for debugging
    #[inline]
    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: ?Sized + Send + Sync + 'static> Injectable for T {}

/// One declared parameter or field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Param {
    /// Identity of the requested type
    pub type_id: TypeId,
    /// Human-readable type name
    pub type_name: &'static str,
    /// Whether a missing bean resolves to `None` instead of failing
    pub optional: bool,
}

impl Param {
    /// Describe a required parameter of type `T`
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            optional: false,
        }
    }

    /// Describe an optional parameter of type `T`
    #[inline]
    pub fn optional<T: ?Sized + 'static>() -> Self {
        Self {
            optional: true,
            ..Self::of::<T>()
        }
    }
}

// =============================================================================
// Dependency - a single constructor argument
// =============================================================================

/// A single injectable argument.
///
/// - `Arc<T>` - required bean
/// - `Option<Arc<T>>` - optional bean (`None` when no bean exposes `T`)
pub trait Dependency: Sized + 'static {
    /// Describe the requested type
    fn param() -> Param;

    /// Resolve the argument from the container
    fn resolve(container: &Container) -> Result<Self>;
}

impl<T: ?Sized + Injectable> Dependency for Arc<T> {
    #[inline]
    fn param() -> Param {
        Param::of::<T>()
    }

    #[inline]
    fn resolve(container: &Container) -> Result<Self> {
        container.get::<T>()
    }
}

impl<T: ?Sized + Injectable> Dependency for Option<Arc<T>> {
    #[inline]
    fn param() -> Param {
        Param::optional::<T>()
    }

    fn resolve(container: &Container) -> Result<Self> {
        match container.get::<T>() {
            Ok(bean) => Ok(Some(bean)),
            Err(IocError::BeanNotFoundByType { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

// =============================================================================
// Dependencies - an ordered constructor parameter list
// =============================================================================

/// An ordered constructor parameter list.
///
/// Implemented for:
/// - `()` - no parameters
/// - `Arc<T>` / `Option<Arc<T>>` - one parameter
/// - tuples of 2 to 8 [`Dependency`] values
///
/// Parameters are resolved left to right, each through a recursive
/// [`Container::get`].
pub trait Dependencies: Sized + 'static {
    /// Describe every parameter in declaration order
    fn params() -> Vec<Param>;

    /// Resolve every parameter from the container
    fn resolve(container: &Container) -> Result<Self>;
}

// No dependencies
impl Dependencies for () {
    #[inline]
    fn params() -> Vec<Param> {
        Vec::new()
    }

    #[inline]
    fn resolve(_container: &Container) -> Result<Self> {
        Ok(())
    }
}

// Single dependency
impl<T: ?Sized + Injectable> Dependencies for Arc<T> {
    #[inline]
    fn params() -> Vec<Param> {
        vec![<Self as Dependency>::param()]
    }

    #[inline]
    fn resolve(container: &Container) -> Result<Self> {
        <Self as Dependency>::resolve(container)
    }
}

// Optional dependency
impl<T: ?Sized + Injectable> Dependencies for Option<Arc<T>> {
    #[inline]
    fn params() -> Vec<Param> {
        vec![<Self as Dependency>::param()]
    }

    #[inline]
    fn resolve(container: &Container) -> Result<Self> {
        <Self as Dependency>::resolve(container)
    }
}

// Tuple implementations (2-8 elements)
macro_rules! impl_dependencies_tuple {
    ($($T:ident),+) => {
        impl<$($T: Dependency),+> Dependencies for ($($T,)+) {
            #[inline]
            fn params() -> Vec<Param> {
                vec![$(<$T as Dependency>::param()),+]
            }

            #[inline]
            fn resolve(container: &Container) -> Result<Self> {
                Ok(($(<$T as Dependency>::resolve(container)?,)+))
            }
        }
    };
}

impl_dependencies_tuple!(A, B);
impl_dependencies_tuple!(A, B, C);
impl_dependencies_tuple!(A, B, C, D);
impl_dependencies_tuple!(A, B, C, D, E);
impl_dependencies_tuple!(A, B, C, D, E, F);
impl_dependencies_tuple!(A, B, C, D, E, F, G);
impl_dependencies_tuple!(A, B, C, D, E, F, G, H);
