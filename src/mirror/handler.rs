use std::sync::Arc;

use crate::DynamicObject;

/// Callbacks for changes applied to a mirror.
///
/// Handlers run on the reflector task, after the store lock is released.
/// Keep them short; a slow handler delays the watch stream.
pub trait ResourceEventHandler: Send + Sync + 'static {
    fn on_add(
        &self,
        _obj: &Arc<DynamicObject>,
    ) {
    }

    fn on_update(
        &self,
        _old: &Arc<DynamicObject>,
        _new: &Arc<DynamicObject>,
    ) {
    }

    fn on_delete(
        &self,
        _obj: &Arc<DynamicObject>,
    ) {
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Notification {
    Add(Arc<DynamicObject>),
    Update(Arc<DynamicObject>, Arc<DynamicObject>),
    Delete(Arc<DynamicObject>),
}

impl Notification {
    pub(crate) fn deliver(
        &self,
        handler: &dyn ResourceEventHandler,
    ) {
        match self {
            Notification::Add(obj) => handler.on_add(obj),
            Notification::Update(old, new) => handler.on_update(old, new),
            Notification::Delete(obj) => handler.on_delete(obj),
        }
    }
}
