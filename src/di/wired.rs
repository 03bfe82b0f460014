use super::param::Resolved;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

/// A property slot the container can fill once
pub trait Assign: Send + Sync {
    fn assign(&self, value: Resolved) -> anyhow::Result<()>;
}

/// A dependency injected after construction.
///
/// Property injection is how cyclic graphs are wired: the slot is empty while
/// the owner is constructed and filled before its start method runs.
///
/// # Panics
///
/// Dereferencing an unwired slot panics; use [`Wired::get`] where the object
/// may be observed before it is fully wired.
pub struct Wired<T>(OnceLock<Arc<T>>);

impl<T: Any + Send + Sync> Wired<T> {
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.0.get().cloned()
    }

    pub fn is_wired(&self) -> bool {
        self.0.get().is_some()
    }
}

impl<T: Any + Send + Sync> Default for Wired<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Any + Send + Sync> Assign for Wired<T> {
    fn assign(&self, value: Resolved) -> anyhow::Result<()> {
        self.0
            .set(value.object::<T>()?)
            .map_err(|_| anyhow::anyhow!("{} is already wired", std::any::type_name::<T>()))
    }
}

impl<T> Deref for Wired<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.0.get() {
            Some(value) => value,
            None => panic!("{} has not been wired yet", std::any::type_name::<T>()),
        }
    }
}

impl<T> fmt::Debug for Wired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Wired").field(&self.0.get().is_some()).finish()
    }
}

/// Like [`Wired`], for a dependency selected through a trait alias
pub struct WiredDyn<T: ?Sized>(OnceLock<Arc<T>>);

impl<T: ?Sized + Send + Sync + 'static> WiredDyn<T> {
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.0.get().cloned()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for WiredDyn<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Assign for WiredDyn<T> {
    fn assign(&self, value: Resolved) -> anyhow::Result<()> {
        self.0
            .set(value.object_dyn::<T>()?)
            .map_err(|_| anyhow::anyhow!("{} is already wired", std::any::type_name::<T>()))
    }
}

impl<T: ?Sized> Deref for WiredDyn<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.0.get() {
            Some(value) => value,
            None => panic!("{} has not been wired yet", std::any::type_name::<T>()),
        }
    }
}

/// Every object of a type or group, in lookup order
pub struct WiredAll<T>(OnceLock<Vec<Arc<T>>>);

impl<T: Any + Send + Sync> WiredAll<T> {
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Empty until wired
    pub fn items(&self) -> &[Arc<T>] {
        self.0.get().map(Vec::as_slice).unwrap_or_default()
    }
}

impl<T: Any + Send + Sync> Default for WiredAll<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Any + Send + Sync> Assign for WiredAll<T> {
    fn assign(&self, value: Resolved) -> anyhow::Result<()> {
        self.0
            .set(value.objects::<T>()?)
            .map_err(|_| anyhow::anyhow!("{} list is already wired", std::any::type_name::<T>()))
    }
}

/// A configuration or literal value injected as a property
pub struct Setting<T>(OnceLock<T>);

impl<T: DeserializeOwned + Send + Sync> Setting<T> {
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }
}

impl<T: DeserializeOwned + Send + Sync> Default for Setting<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send + Sync> Assign for Setting<T> {
    fn assign(&self, value: Resolved) -> anyhow::Result<()> {
        self.0
            .set(value.value::<T>()?)
            .map_err(|_| anyhow::anyhow!("setting is already assigned"))
    }
}

impl<T> Deref for Setting<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.0.get() {
            Some(value) => value,
            None => panic!("{} setting has not been assigned", std::any::type_name::<T>()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Setting").field(&self.0.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wired_assigns_once() {
        let slot: Wired<String> = Wired::new();
        assert!(!slot.is_wired());

        slot.assign(Resolved::object_of(Arc::new("db".to_string()))).unwrap();
        assert_eq!(slot.as_str(), "db");
        assert!(slot.assign(Resolved::object_of(Arc::new("x".to_string()))).is_err());
    }

    #[test]
    fn test_wired_rejects_wrong_type() {
        let slot: Wired<String> = Wired::new();
        assert!(slot.assign(Resolved::object_of(Arc::new(1u32))).is_err());
        assert!(slot.get().is_none());
    }

    #[test]
    #[should_panic(expected = "has not been wired")]
    fn test_unwired_deref_panics() {
        let slot: Wired<String> = Wired::new();
        let _ = slot.len();
    }

    #[test]
    fn test_setting_and_list() {
        let setting: Setting<Vec<u16>> = Setting::new();
        setting.assign(json!([1, 2]).into()).unwrap();
        assert_eq!(*setting, vec![1, 2]);

        let all: WiredAll<u8> = WiredAll::new();
        assert!(all.items().is_empty());
        all.assign(Resolved::List(vec![Arc::new(1u8), Arc::new(2u8)])).unwrap();
        assert_eq!(all.items().len(), 2);
    }
}
