use crate::core::value::{ObjectCell, ObjectData, ObjectRef};
use crate::runtime::context::ClassDef;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// Registry of live objects shared by every object the VM allocates.
///
/// Handles are recycled the way the engine's object store does: the most
/// recently freed id is reused first. Objects whose last handle drops while
/// a destructor is still owed are parked in `pending` until the VM drains it.
#[derive(Default)]
pub struct ObjectStore {
    next_id: Cell<u32>,
    free_ids: RefCell<Vec<u32>>,
    live: RefCell<BTreeMap<u32, Weak<ObjectCell>>>,
    pending: RefCell<Vec<ObjectRef>>,
    /// Set after an uncaught error: released objects are freed without destructors
    release_disabled: Cell<bool>,
}

impl ObjectStore {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            next_id: Cell::new(1),
            ..Default::default()
        })
    }

    pub fn alloc(
        self: &Rc<Self>,
        class: Rc<ClassDef>,
        data: ObjectData,
        wants_release: bool,
    ) -> ObjectRef {
        let id = match self.free_ids.borrow_mut().pop() {
            Some(id) => id,
            None => {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                id
            }
        };
        let obj = ObjectRef::new(id, class, data, Rc::clone(self), wants_release);
        self.live.borrow_mut().insert(id, obj.downgrade());
        obj
    }

    pub(crate) fn on_free(&self, id: u32) {
        if let Ok(mut live) = self.live.try_borrow_mut() {
            live.remove(&id);
        }
        if let Ok(mut free) = self.free_ids.try_borrow_mut() {
            free.push(id);
        }
    }

    /// Queues a released object for destruction. Returns false when the
    /// queue cannot take it, in which case the object is freed directly.
    pub(crate) fn defer_release(&self, obj: ObjectRef) -> bool {
        if self.release_disabled.get() {
            return false;
        }
        match self.pending.try_borrow_mut() {
            Ok(mut pending) => {
                pending.push(obj);
                true
            }
            Err(_) => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.try_borrow().map(|p| !p.is_empty()).unwrap_or(false)
    }

    /// Takes the objects queued so far, oldest first.
    pub fn take_pending(&self) -> Vec<ObjectRef> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn disable_release(&self) {
        self.release_disabled.set(true);
        let pending = self.take_pending();
        drop(pending);
    }

    pub fn release_disabled(&self) -> bool {
        self.release_disabled.get()
    }

    /// Strong handles to every live object, in allocation-id order.
    pub fn live_objects(&self) -> Vec<ObjectRef> {
        let weaks: Vec<Weak<ObjectCell>> = self.live.borrow().values().cloned().collect();
        weaks.iter().filter_map(ObjectRef::upgrade).collect()
    }

    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("live", &self.live.borrow().len())
            .field("next_id", &self.next_id.get())
            .finish()
    }
}
