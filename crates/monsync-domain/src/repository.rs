use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::error::DomainError;
use crate::types::{ConfigObject, Downtime, ObjectKind, ObjectName};

/// Lifecycle events the writer subscribes to. Each carries a snapshot of the
/// object involved so a subscriber never has to re-read the repository
/// under lock from inside its own event handler.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    StateChange(Arc<ConfigObject>),
    AcknowledgementCleared(Arc<ConfigObject>),
    ActiveChanged(Arc<ConfigObject>),
    VersionChanged(Arc<ConfigObject>),
    DowntimeStarted(Arc<Downtime>),
    DowntimeTriggered(Arc<Downtime>),
    DowntimeRemoved(Arc<Downtime>),
}

#[derive(Default)]
struct Inner {
    objects: HashMap<(ObjectKind, ObjectName), ConfigObject>,
}

/// Stand-in for the external config-object system: holds every known
/// object and fans lifecycle events out to any number of subscribers
/// (each writer instance keeps its own [`broadcast::Receiver`]).
pub struct ObjectRepository {
    inner: RwLock<Inner>,
    events: broadcast::Sender<DomainEvent>,
}

impl ObjectRepository {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(1024);
        ObjectRepository {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DomainEvent) {
        // No subscribers is a normal state (e.g. before any writer attaches);
        // a send error there is not a failure.
        let _ = self.events.send(event);
    }

    /// Inserts a brand-new object or overwrites an existing one, bumping its
    /// version. Fires both `ActiveChanged` and `VersionChanged`, mirroring
    /// config-object creation firing both signals in the same pass.
    pub async fn upsert(&self, mut object: ConfigObject) {
        let key = (object.kind(), object.name().clone());
        {
            let mut guard = self.inner.write().await;
            if let Some(existing) = guard.objects.get(&key) {
                object.meta_mut().version = existing.meta().version + 1;
            }
            guard.objects.insert(key, object.clone());
        }
        let arc = Arc::new(object);
        self.emit(DomainEvent::ActiveChanged(arc.clone()));
        self.emit(DomainEvent::VersionChanged(arc));
    }

    /// Marks an object inactive and removes it, firing `ActiveChanged` with
    /// `active == false` so the writer can tell deletes apart from updates.
    pub async fn deactivate(&self, kind: ObjectKind, name: &ObjectName) -> Result<(), DomainError> {
        let removed = {
            let mut guard = self.inner.write().await;
            guard.objects.remove(&(kind, name.clone()))
        };
        let mut object = removed.ok_or_else(|| DomainError::NotFound {
            kind,
            name: name.to_string(),
        })?;
        object.meta_mut().active = false;
        self.emit(DomainEvent::ActiveChanged(Arc::new(object)));
        Ok(())
    }

    pub async fn get(&self, kind: ObjectKind, name: &ObjectName) -> Option<ConfigObject> {
        self.inner.read().await.objects.get(&(kind, name.clone())).cloned()
    }

    pub async fn all(&self) -> Vec<ConfigObject> {
        self.inner.read().await.objects.values().cloned().collect()
    }

    pub async fn of_kind(&self, kind: ObjectKind) -> Vec<ConfigObject> {
        self.inner
            .read()
            .await
            .objects
            .values()
            .filter(|o| o.kind() == kind)
            .cloned()
            .collect()
    }

    /// Applies an in-place mutation to a stored checkable and fires
    /// `StateChange`. The closure receives the full object so it can reach
    /// into `CheckableState` on either `Host` or `Service`.
    pub async fn update_state<F>(
        &self,
        kind: ObjectKind,
        name: &ObjectName,
        mutate: F,
    ) -> Result<(), DomainError>
    where
        F: FnOnce(&mut ConfigObject),
    {
        let updated = {
            let mut guard = self.inner.write().await;
            let key = (kind, name.clone());
            let object = guard.objects.get_mut(&key).ok_or_else(|| DomainError::NotFound {
                kind,
                name: name.to_string(),
            })?;
            mutate(object);
            object.meta_mut().bump_version();
            object.clone()
        };
        self.emit(DomainEvent::StateChange(Arc::new(updated)));
        Ok(())
    }

    pub async fn clear_acknowledgement(
        &self,
        kind: ObjectKind,
        name: &ObjectName,
    ) -> Result<(), DomainError> {
        let updated = {
            let mut guard = self.inner.write().await;
            let key = (kind, name.clone());
            let object = guard.objects.get_mut(&key).ok_or_else(|| DomainError::NotFound {
                kind,
                name: name.to_string(),
            })?;
            if let Some(state) = object.checkable_state_mut() {
                state.is_acknowledged = false;
            }
            object.meta_mut().bump_version();
            object.clone()
        };
        self.emit(DomainEvent::AcknowledgementCleared(Arc::new(updated)));
        Ok(())
    }

    pub async fn start_downtime(&self, downtime: Downtime) {
        self.upsert(ConfigObject::Downtime(downtime.clone())).await;
        self.emit(DomainEvent::DowntimeStarted(Arc::new(downtime)));
    }

    pub async fn trigger_downtime(&self, name: &ObjectName, trigger_time: f64) -> Result<(), DomainError> {
        let updated = {
            let mut guard = self.inner.write().await;
            let key = (ObjectKind::Downtime, name.clone());
            let object = guard.objects.get_mut(&key).ok_or_else(|| DomainError::NotFound {
                kind: ObjectKind::Downtime,
                name: name.to_string(),
            })?;
            if let ConfigObject::Downtime(d) = object {
                d.trigger_time = Some(trigger_time);
            }
            object.meta_mut().bump_version();
            object.clone()
        };
        if let ConfigObject::Downtime(d) = &updated {
            self.emit(DomainEvent::DowntimeTriggered(Arc::new(d.clone())));
        }
        Ok(())
    }

    pub async fn remove_downtime(&self, name: &ObjectName) -> Result<(), DomainError> {
        let removed = {
            let mut guard = self.inner.write().await;
            guard.objects.remove(&(ObjectKind::Downtime, name.clone()))
        };
        let object = removed.ok_or_else(|| DomainError::NotFound {
            kind: ObjectKind::Downtime,
            name: name.to_string(),
        })?;
        if let ConfigObject::Downtime(d) = object {
            self.emit(DomainEvent::DowntimeRemoved(Arc::new(d)));
        }
        Ok(())
    }
}

impl Default for ObjectRepository {
    fn default() -> Self {
        Self::new()
    }
}
