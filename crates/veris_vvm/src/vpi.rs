//! The VPI object registry.
//!
//! Compile-time VPI objects (registers, nets, scopes, system task
//! calls, string and number arguments) are indexed so they can be linked
//! together as they are created; a [`VpiRef`] is an opaque handle into
//! the registry. Host-provided system tasks implement [`SystemTask`]
//! and are entered by the `%vpi_call` instruction.

use std::collections::BTreeMap;

/// An opaque handle to a VPI object. Index 0 is the null handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct VpiRef(u32);

impl VpiRef {
    /// The null handle.
    pub const NULL: VpiRef = VpiRef(0);

    /// Creates a handle from a raw index.
    pub fn from_raw(index: u32) -> Self {
        VpiRef(index)
    }

    /// The raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// True for the null handle.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A compile-time VPI object.
#[derive(Clone, PartialEq, Debug)]
pub enum VpiObject {
    /// The reserved null object.
    Null,
    /// The simulation time, pre-registered as `$time`.
    SimTime,
    /// A variable vector published by `.var`.
    Reg {
        /// The design name of the variable.
        name: String,
        /// Most significant source index.
        msb: i64,
        /// Least significant source index.
        lsb: i64,
        /// Signedness of the vector.
        signed: bool,
        /// Base index of the vector's functors.
        base: u32,
    },
    /// A net vector published by `.net`.
    Net {
        /// The design name of the net.
        name: String,
        /// Most significant source index.
        msb: i64,
        /// Least significant source index.
        lsb: i64,
        /// Signedness of the vector.
        signed: bool,
        /// Base index of the vector's functors.
        base: u32,
    },
    /// A scope published by `.scope`.
    Scope {
        /// The scope name.
        name: String,
        /// The parent scope handle, null for a root scope.
        parent: VpiRef,
    },
    /// A string literal argument.
    Str(String),
    /// A numeric literal argument.
    Number(u64),
    /// A bundled system task call built by `%vpi_call`.
    SysTaskCall {
        /// The task name, including the `$`.
        name: String,
        /// The argument handles.
        args: Vec<VpiRef>,
    },
}

/// The registry of all VPI objects in a simulation.
#[derive(Debug)]
pub struct VpiRegistry {
    objects: Vec<VpiObject>,
}

impl Default for VpiRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VpiRegistry {
    /// Creates a registry with the reserved null object.
    pub fn new() -> Self {
        Self {
            objects: vec![VpiObject::Null],
        }
    }

    /// Registers an object, returning its handle.
    pub fn register(&mut self, obj: VpiObject) -> VpiRef {
        let handle = VpiRef::from_raw(self.objects.len() as u32);
        self.objects.push(obj);
        handle
    }

    /// Returns the object behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range.
    pub fn get(&self, handle: VpiRef) -> &VpiObject {
        &self.objects[handle.as_raw() as usize]
    }

    /// True if the handle names a scope object.
    pub fn is_scope(&self, handle: VpiRef) -> bool {
        matches!(self.get(handle), VpiObject::Scope { .. })
    }

    /// True if `scope` equals `ancestor` or sits below it in the scope
    /// tree.
    pub fn scope_within(&self, scope: VpiRef, ancestor: VpiRef) -> bool {
        let mut cur = scope;
        while !cur.is_null() {
            if cur == ancestor {
                return true;
            }
            cur = match self.get(cur) {
                VpiObject::Scope { parent, .. } => *parent,
                _ => return false,
            };
        }
        false
    }

    /// The number of registered objects, including the null object.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when only the null object exists.
    pub fn is_empty(&self) -> bool {
        self.objects.len() <= 1
    }
}

/// What a system task tells the scheduler to do next.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TaskAction {
    /// The call completed; the thread continues.
    Done,
    /// The call suspended the thread; the host resumes it later.
    Suspend,
}

/// The environment a system task runs in.
pub struct TaskContext<'a> {
    /// The VPI registry, for resolving argument handles.
    pub registry: &'a VpiRegistry,
    /// The call's argument handles.
    pub args: &'a [VpiRef],
    /// The current simulation time.
    pub time: u64,
    /// Collected task output lines.
    pub output: &'a mut Vec<String>,
}

/// A host-provided system task implementation.
pub trait SystemTask {
    /// Runs the task. Returning [`TaskAction::Suspend`] parks the
    /// calling thread.
    fn invoke(&mut self, ctx: &mut TaskContext<'_>) -> TaskAction;
}

/// The host tasks registered for a simulation, keyed by name.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Box<dyn SystemTask>>,
}

impl TaskRegistry {
    /// Creates an empty task registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task under its `$name`.
    pub fn register(&mut self, name: &str, task: Box<dyn SystemTask>) {
        self.tasks.insert(name.to_string(), task);
    }

    /// True if a task with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Returns the task for a name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Box<dyn SystemTask>> {
        self.tasks.get_mut(name)
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .finish()
    }
}
