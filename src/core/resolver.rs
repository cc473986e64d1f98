//! Transitive bean dependency resolution.
//!
//! Resolution walks declared dependencies depth first, following decorators
//! down to the factory that actually declares them. A dependency edge that
//! leads back to the root bean type is a cycle. Keys already collected are not
//! walked again, so cycles further down the graph that do not involve the
//! root terminate and are reported when one of their members is resolved as
//! the root.

use std::collections::HashSet;

use crate::{
    core::{
        bean::BeanKey,
        error::BeanError,
        registry::{FactoryBean, FactoryBeanRegistry},
    },
    ports::factory_bean::FactoryBeanPlugin,
};

/// Collect every bean `root` depends on, directly or transitively.
///
/// The result is in discovery order and never contains `root` itself.
pub fn resolve_transitive_dependencies(
    registry: &FactoryBeanRegistry,
    root: &FactoryBean,
) -> Result<Vec<BeanKey>, BeanError> {
    let mut resolver = Resolver {
        registry,
        root,
        seen: HashSet::new(),
        ordered: Vec::new(),
    };
    resolver.walk(root.plugin().as_ref(), root.key())?;
    Ok(resolver.ordered)
}

struct Resolver<'a> {
    registry: &'a FactoryBeanRegistry,
    root: &'a FactoryBean,
    seen: HashSet<BeanKey>,
    ordered: Vec<BeanKey>,
}

impl Resolver<'_> {
    fn walk(&mut self, plugin: &dyn FactoryBeanPlugin, declaring: &BeanKey) -> Result<(), BeanError> {
        for dependency in plugin.bean_dependencies() {
            if dependency.bean_type() == self.root.bean_type() {
                return Err(BeanError::CircularDependency {
                    root: self.root.bean_type(),
                    node: plugin.bean_type(),
                });
            }
            if !self.seen.insert(dependency.clone()) {
                continue;
            }

            let factory = self
                .registry
                .lookup(&dependency)
                .map_err(|e| e.as_missing_dependency(declaring, &dependency))?;
            self.ordered.push(dependency.clone());
            self.walk(factory.plugin().as_ref(), &dependency)?;
        }

        if let Some(inner) = plugin.decorated() {
            self.walk(inner, declaring)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::core::{
        bean::{BeanInstance, BeanType},
        context::AstrixContext,
    };

    struct A;
    struct B;
    struct C;

    struct Declares {
        bean_type: BeanType,
        dependencies: Vec<BeanKey>,
    }

    impl Declares {
        fn new<T: Send + Sync + 'static>(dependencies: Vec<BeanKey>) -> Arc<dyn FactoryBeanPlugin> {
            Arc::new(Self {
                bean_type: BeanType::of::<T>(),
                dependencies,
            })
        }
    }

    #[async_trait]
    impl FactoryBeanPlugin for Declares {
        fn bean_type(&self) -> BeanType {
            self.bean_type
        }

        async fn create(
            &self,
            key: &BeanKey,
            _context: &AstrixContext,
        ) -> Result<BeanInstance, BeanError> {
            Err(BeanError::MissingProvider { bean: key.clone() })
        }

        fn bean_dependencies(&self) -> Vec<BeanKey> {
            self.dependencies.clone()
        }
    }

    struct Wrapper(Arc<dyn FactoryBeanPlugin>);

    #[async_trait]
    impl FactoryBeanPlugin for Wrapper {
        fn bean_type(&self) -> BeanType {
            self.0.bean_type()
        }

        async fn create(
            &self,
            key: &BeanKey,
            context: &AstrixContext,
        ) -> Result<BeanInstance, BeanError> {
            self.0.create(key, context).await
        }

        fn decorated(&self) -> Option<&dyn FactoryBeanPlugin> {
            Some(self.0.as_ref())
        }
    }

    fn registry_of(plugins: Vec<Arc<dyn FactoryBeanPlugin>>) -> FactoryBeanRegistry {
        let registry = FactoryBeanRegistry::new();
        for plugin in plugins {
            registry.register(FactoryBean::new(plugin)).unwrap();
        }
        registry
    }

    fn resolve(registry: &FactoryBeanRegistry, key: BeanKey) -> Result<Vec<BeanKey>, BeanError> {
        let root = registry.lookup(&key).unwrap();
        resolve_transitive_dependencies(registry, &root)
    }

    #[test]
    fn test_collects_transitive_dependencies() {
        let registry = registry_of(vec![
            Declares::new::<A>(vec![BeanKey::of::<B>()]),
            Declares::new::<B>(vec![BeanKey::of::<C>()]),
            Declares::new::<C>(vec![]),
        ]);

        let deps = resolve(&registry, BeanKey::of::<A>()).unwrap();
        assert_eq!(deps, vec![BeanKey::of::<B>(), BeanKey::of::<C>()]);
    }

    #[test]
    fn test_cycle_detected_from_both_sides() {
        let registry = registry_of(vec![
            Declares::new::<A>(vec![BeanKey::of::<B>()]),
            Declares::new::<B>(vec![BeanKey::of::<A>()]),
        ]);

        let from_a = resolve(&registry, BeanKey::of::<A>()).unwrap_err();
        assert!(matches!(
            from_a,
            BeanError::CircularDependency { root, node }
                if root == BeanType::of::<A>() && node == BeanType::of::<B>()
        ));

        let from_b = resolve(&registry, BeanKey::of::<B>()).unwrap_err();
        assert!(matches!(
            from_b,
            BeanError::CircularDependency { root, node }
                if root == BeanType::of::<B>() && node == BeanType::of::<A>()
        ));
    }

    #[test]
    fn test_cycle_below_root_terminates() {
        let registry = registry_of(vec![
            Declares::new::<A>(vec![BeanKey::of::<B>()]),
            Declares::new::<B>(vec![BeanKey::of::<C>()]),
            Declares::new::<C>(vec![BeanKey::of::<B>()]),
        ]);

        let deps = resolve(&registry, BeanKey::of::<A>()).unwrap();
        assert_eq!(deps.len(), 2);
        assert!(resolve(&registry, BeanKey::of::<B>()).is_err());
    }

    #[test]
    fn test_missing_dependency_attributed_to_declaring_bean() {
        let registry = registry_of(vec![
            Declares::new::<A>(vec![BeanKey::of::<B>()]),
            Declares::new::<B>(vec![BeanKey::of::<C>()]),
        ]);

        let err = resolve(&registry, BeanKey::of::<A>()).unwrap_err();
        assert!(matches!(
            err,
            BeanError::MissingDependency { dependent, missing }
                if dependent == BeanKey::of::<B>() && missing == BeanKey::of::<C>()
        ));
    }

    #[test]
    fn test_follows_decorators() {
        let registry = registry_of(vec![
            Arc::new(Wrapper(Declares::new::<A>(vec![BeanKey::of::<B>()]))),
            Declares::new::<B>(vec![BeanKey::of::<A>()]),
        ]);

        assert!(matches!(
            resolve(&registry, BeanKey::of::<A>()),
            Err(BeanError::CircularDependency { .. })
        ));
    }
}
