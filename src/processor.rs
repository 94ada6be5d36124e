//! Bean post-processing
//!
//! Post-processors see every finished bean (constructed and injected) and
//! may hand back a different one, typically a bean whose views have been
//! replaced by decorators.

use crate::bean::Bean;
use crate::Result;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Hook run on each bean after injection.
///
/// Return values:
/// - `Ok(Some(bean))` - continue the chain with `bean` (the same or a
///   replacement)
/// - `Ok(None)` - stop the chain; the bean accumulated so far is kept
/// - `Err(_)` - abort creation of the bean
///
/// Register implementations with
/// [`ComponentBuilder::post_processor`](crate::ComponentBuilder::post_processor).
pub trait BeanPostProcessor: Send + Sync {
    /// Inspect or replace `bean`, registered under `name`
    fn post_process(&self, bean: Arc<Bean>, name: &str) -> Result<Option<Arc<Bean>>>;
}

/// Run `bean` through `chain` in order.
pub(crate) fn apply_chain(
    chain: &[Arc<dyn BeanPostProcessor>],
    bean: Arc<Bean>,
    name: &str,
) -> Result<Arc<Bean>> {
    let mut current = bean;
    for (index, processor) in chain.iter().enumerate() {
        match processor.post_process(Arc::clone(&current), name)? {
            Some(next) => current = next,
            None => {
                #[cfg(feature = "logging")]
                trace!(
                    target: "sprout_ioc",
                    bean = name,
                    processor = index,
                    "Post-processor chain stopped early"
                );
                #[cfg(not(feature = "logging"))]
                let _ = index;
                break;
            }
        }
    }
    Ok(current)
}
