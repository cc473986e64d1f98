//! Bean identity and typed bean handles.
//!
//! Beans travel through the context type-erased as [`AnyInstance`], an
//! `Arc<dyn Any + Send + Sync>` that always holds an `Arc<T>`. Keeping the
//! inner `Arc<T>` lets `T` be a trait object such as `dyn Greeter`, which is
//! how consumers usually name the API they depend on.

use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::Arc,
    time::Duration,
};

use crate::core::{error::BeanError, stateful::StatefulBeanInstance};

/// Type-erased bean instance. Always wraps an `Arc<T>` for the bean's type `T`.
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

/// Erase a typed instance so it can be stored next to beans of other types.
pub fn erase<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> AnyInstance {
    Arc::new(instance)
}

/// Recover the typed instance from an erased one.
pub fn downcast<T: ?Sized + Send + Sync + 'static>(instance: &AnyInstance) -> Option<Arc<T>> {
    (**instance).downcast_ref::<Arc<T>>().cloned()
}

fn holds<T: ?Sized + Send + Sync + 'static>(instance: &AnyInstance) -> bool {
    (**instance).is::<Arc<T>>()
}

/// Runtime identity of a bean type.
///
/// Equality and hashing only look at the [`TypeId`]; the name is kept for
/// log and error messages.
#[derive(Clone, Copy)]
pub struct BeanType {
    id: TypeId,
    name: &'static str,
    accepts: fn(&AnyInstance) -> bool,
}

impl BeanType {
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            accepts: holds::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether an erased instance really is an instance of this type.
    pub fn accepts(&self, instance: &AnyInstance) -> bool {
        (self.accepts)(instance)
    }
}

impl PartialEq for BeanType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BeanType {}

impl Hash for BeanType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identity of a bean: its type plus an optional qualifier.
///
/// An empty qualifier is the same as no qualifier at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeanKey {
    bean_type: BeanType,
    qualifier: Option<String>,
}

impl BeanKey {
    pub fn new(bean_type: BeanType, qualifier: Option<&str>) -> Self {
        Self {
            bean_type,
            qualifier: qualifier.filter(|q| !q.is_empty()).map(str::to_string),
        }
    }

    /// Unqualified key for `T`.
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self::new(BeanType::of::<T>(), None)
    }

    pub fn qualified<T: ?Sized + Send + Sync + 'static>(qualifier: &str) -> Self {
        Self::new(BeanType::of::<T>(), Some(qualifier))
    }

    pub fn bean_type(&self) -> BeanType {
        self.bean_type
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// The unqualified key of the same type.
    pub fn unqualified(&self) -> Self {
        Self::new(self.bean_type, None)
    }
}

impl fmt::Display for BeanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}-{}", self.bean_type, qualifier),
            None => write!(f, "{}", self.bean_type),
        }
    }
}

/// What a factory produced: a plain library instance, or a stateful bean
/// whose target comes and goes with service availability.
#[derive(Clone)]
pub enum BeanInstance {
    Library(AnyInstance),
    Stateful(Arc<StatefulBeanInstance>),
}

impl fmt::Debug for BeanInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library(_) => f.write_str("Library"),
            Self::Stateful(bean) => write!(f, "Stateful({})", bean.state_kind()),
        }
    }
}

/// Typed handle returned by `AstrixContext::get_bean`.
///
/// For stateful beans every call goes through [`Bean::invoke`] or
/// [`Bean::get`], which dispatch to whatever the bean is currently bound to,
/// so a handle obtained while the service was down starts working as soon
/// as the bean binds.
pub struct Bean<T: ?Sized> {
    key: BeanKey,
    instance: BeanInstance,
    _type: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> Clone for Bean<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            instance: self.instance.clone(),
            _type: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Bean<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bean")
            .field("key", &self.key)
            .field("instance", &self.instance)
            .finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Bean<T> {
    pub(crate) fn new(key: BeanKey, instance: BeanInstance) -> Result<Self, BeanError> {
        let expected = BeanType::of::<T>();
        let compatible = match &instance {
            BeanInstance::Library(library) => expected.accepts(library),
            BeanInstance::Stateful(_) => key.bean_type() == expected,
        };
        if !compatible {
            return Err(BeanError::IncompatibleInstance {
                bean: key,
                requested: expected,
            });
        }

        Ok(Self {
            key,
            instance,
            _type: PhantomData,
        })
    }

    pub fn key(&self) -> &BeanKey {
        &self.key
    }

    /// The current target.
    pub fn get(&self) -> Result<Arc<T>, BeanError> {
        let target = match &self.instance {
            BeanInstance::Library(library) => library.clone(),
            BeanInstance::Stateful(bean) => bean.current_target()?,
        };
        downcast::<T>(&target).ok_or_else(|| BeanError::IncompatibleInstance {
            bean: self.key.clone(),
            requested: BeanType::of::<T>(),
        })
    }

    /// Invoke `call` on the current target.
    ///
    /// The closure's result is returned untouched; only failures to reach a
    /// target are reported as [`BeanError`].
    pub fn invoke<R>(&self, call: impl FnOnce(&T) -> R) -> Result<R, BeanError> {
        let target = self.get()?;
        Ok(call(&target))
    }

    /// Id of the backing stateful bean. Library beans have none.
    pub fn bean_id(&self) -> Option<u64> {
        match &self.instance {
            BeanInstance::Library(_) => None,
            BeanInstance::Stateful(bean) => Some(bean.id()),
        }
    }

    pub fn is_stateful(&self) -> bool {
        matches!(self.instance, BeanInstance::Stateful(_))
    }

    /// Library beans are always bound.
    pub fn is_bound(&self) -> bool {
        match &self.instance {
            BeanInstance::Library(_) => true,
            BeanInstance::Stateful(bean) => bean.is_bound(),
        }
    }

    pub fn state_name(&self) -> &'static str {
        match &self.instance {
            BeanInstance::Library(_) => "Library",
            BeanInstance::Stateful(bean) => bean.state_kind().name(),
        }
    }

    pub async fn wait_until_bound(&self, timeout: Duration) -> Result<(), BeanError> {
        match &self.instance {
            BeanInstance::Library(_) => Ok(()),
            BeanInstance::Stateful(bean) => bean.wait_until_bound(timeout).await,
        }
    }
}
