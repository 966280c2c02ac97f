//! Native frames and non-local exits.
//!
//! Raising is a plain `Err(Unwind::Raise(exc))` travelling up through `?`.
//! What this module adds is the bookkeeping around it: a frame chain whose
//! cleanups run on every exit path, rescue targets that select exceptions
//! by class, and the top-level boundary that turns an unhandled exception
//! into a [`Termination`].

use crate::errors::{ErrorKind, InvariantViolation, Unwind};
use crate::objects::{Array, Exception, Str};
use crate::value::Value;
use crate::vm::VM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Native,
    Method,
    Package,
    Class,
    /// Boundary frame opened by [`VM::execute`].
    Finish,
}

/// Cleanup registered on a frame. Receives the resource it guards.
pub type Cleanup = Box<dyn FnOnce(&mut VM, Value) -> Result<(), Unwind>>;

pub struct Frame {
    pub kind: FrameKind,
    pub name: String,
    pub receiver: Value,
    cleanups: Vec<(Value, Cleanup)>,
}

impl Frame {
    fn new(kind: FrameKind, name: String, receiver: Value) -> Self {
        Self {
            kind,
            name,
            receiver,
            cleanups: Vec::new(),
        }
    }

    pub(crate) fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        visitor(&mut self.receiver);
        for (resource, _) in self.cleanups.iter_mut() {
            visitor(resource);
        }
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("receiver", &self.receiver)
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

/// Values a frame's result keeps alive while the frame's cleanups run.
///
/// A cleanup may allocate, so a `Value` travelling back through
/// [`VM::call_frame`] must be rooted until the last cleanup is done.
pub trait Rootable {
    fn roots(&self, out: &mut Vec<Value>);
}

impl Rootable for Value {
    fn roots(&self, out: &mut Vec<Value>) {
        out.push(*self);
    }
}

impl<T: Rootable> Rootable for Option<T> {
    fn roots(&self, out: &mut Vec<Value>) {
        if let Some(value) = self {
            value.roots(out);
        }
    }
}

impl<T: Rootable> Rootable for Vec<T> {
    fn roots(&self, out: &mut Vec<Value>) {
        for value in self {
            value.roots(out);
        }
    }
}

impl<A: Rootable, B: Rootable> Rootable for (A, B) {
    fn roots(&self, out: &mut Vec<Value>) {
        self.0.roots(out);
        self.1.roots(out);
    }
}

macro_rules! unmanaged {
    ($($ty:ty),*) => {
        $(impl Rootable for $ty {
            fn roots(&self, _out: &mut Vec<Value>) {}
        })*
    };
}

unmanaged!((), bool, i32, i64, usize, f64, String);

/// An open `rescue`: the classes it accepts and the frame depth it was
/// entered at.
#[derive(Debug, Clone)]
pub struct UnwindTarget {
    pub classes: Vec<Value>,
    pub frame_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindState {
    Running,
    /// An exception is propagating and has not been caught yet.
    Unwinding,
    /// A handler is running for a caught exception.
    Handled,
}

/// How a top-level [`VM::execute`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Completed(Value),
    Unhandled {
        class_name: String,
        message: String,
        stack_trace: Vec<String>,
    },
    Aborted(InvariantViolation),
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(_) => 0,
            Self::Unhandled { .. } => 1,
            Self::Aborted(_) => 70,
        }
    }
}

impl VM {
    pub fn unwind_state(&self) -> UnwindState {
        self.unwind_state
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn unwind_targets(&self) -> &[UnwindTarget] {
        &self.targets
    }

    /// Frame names, innermost first.
    pub fn frame_names(&self) -> Vec<String> {
        self.frames.iter().rev().map(|frame| frame.name.clone()).collect()
    }

    /// Runs `body` inside a new frame. The frame's cleanups run in reverse
    /// registration order however `body` exits.
    pub fn call_frame<T: Rootable>(
        &mut self,
        kind: FrameKind,
        name: impl Into<String>,
        receiver: Value,
        body: impl FnOnce(&mut VM) -> Result<T, Unwind>,
    ) -> Result<T, Unwind> {
        self.frames.push(Frame::new(kind, name.into(), receiver));
        let depth = self.frames.len();
        let result = body(self);
        debug_assert_eq!(self.frames.len(), depth, "frame chain must nest");
        self.leave_frame(result)
    }

    fn leave_frame<T: Rootable>(&mut self, result: Result<T, Unwind>) -> Result<T, Unwind> {
        let Some(frame) = self.frames.pop() else {
            return Err(InvariantViolation::NoActiveFrame.into());
        };
        let mut result = result;
        for (resource, cleanup) in frame.cleanups.into_iter().rev() {
            let mark = self.in_flight.len();
            match &result {
                Ok(value) => value.roots(&mut self.in_flight),
                Err(Unwind::Raise(exc)) => self.in_flight.push(*exc),
                Err(Unwind::Fatal(_)) => {}
            }
            self.in_flight.push(resource);
            let outcome = cleanup(self, resource);
            self.in_flight.truncate(mark);

            let Err(raised) = outcome else {
                continue;
            };
            let original = match &result {
                Err(Unwind::Fatal(_)) => continue,
                Err(Unwind::Raise(exc)) => Some(*exc),
                Ok(_) => None,
            };
            if let (Unwind::Raise(new), Some(original)) = (&raised, original) {
                self.chain_context(*new, original);
            }
            result = Err(raised);
        }
        result
    }

    /// Records `original` as the context of `replacement` unless it already
    /// has one.
    fn chain_context(&mut self, replacement: Value, original: Value) {
        if replacement == original {
            return;
        }
        if let Ok(exc) = self.heap.body_mut::<Exception>(replacement) {
            if exc.context.is_nil() {
                exc.context = original;
                log::debug!("cleanup raised {replacement:?}; chaining {original:?} as its context");
            }
        }
    }

    /// Registers `cleanup` on the current frame; it runs with `resource`
    /// when the frame is left, normally or not.
    pub fn add_cleanup(
        &mut self,
        resource: Value,
        cleanup: impl FnOnce(&mut VM, Value) -> Result<(), Unwind> + 'static,
    ) -> Result<(), Unwind> {
        let frame = self.frames.last_mut().ok_or(InvariantViolation::NoActiveFrame)?;
        frame.cleanups.push((resource, Box::new(cleanup)));
        Ok(())
    }

    /// `body` followed by `cleanup`, which runs even if `body` raises.
    pub fn ensure<T: Rootable>(
        &mut self,
        body: impl FnOnce(&mut VM) -> Result<T, Unwind>,
        cleanup: impl FnOnce(&mut VM) -> Result<(), Unwind> + 'static,
    ) -> Result<T, Unwind> {
        self.call_frame(FrameKind::Native, "ensure", Value::NIL, |vm| {
            vm.add_cleanup(Value::NIL, move |vm, _| cleanup(vm))?;
            body(vm)
        })
    }

    /// Runs `body`; an exception that is an instance of one of `classes`
    /// (any exception when `classes` is empty) is passed to `handler`.
    /// Fatal unwinds always pass through.
    pub fn rescue<T>(
        &mut self,
        classes: &[Value],
        body: impl FnOnce(&mut VM) -> Result<T, Unwind>,
        handler: impl FnOnce(&mut VM, Value) -> Result<T, Unwind>,
    ) -> Result<T, Unwind> {
        let frame_depth = self.frames.len();
        self.targets.push(UnwindTarget {
            classes: classes.to_vec(),
            frame_depth,
        });
        let depth = self.targets.len();
        let result = body(self);
        debug_assert_eq!(self.targets.len(), depth, "rescue targets must nest");
        let Some(target) = self.targets.pop() else {
            return Err(InvariantViolation::Other("rescue target vanished".to_owned()).into());
        };
        debug_assert_eq!(self.frames.len(), target.frame_depth);

        let exc = match result {
            Err(Unwind::Raise(exc)) => exc,
            other => return other,
        };
        if !self.exception_matches(exc, &target.classes)? {
            return Err(Unwind::Raise(exc));
        }

        self.unwind_state = UnwindState::Handled;
        let mark = self.in_flight.len();
        self.in_flight.push(exc);
        let handled = handler(self, exc);
        self.in_flight.truncate(mark);
        match &handled {
            Ok(_) => self.unwind_state = UnwindState::Running,
            Err(Unwind::Raise(_)) => self.unwind_state = UnwindState::Unwinding,
            Err(Unwind::Fatal(_)) => {}
        }
        handled
    }

    pub fn exception_matches(&self, exc: Value, classes: &[Value]) -> Result<bool, Unwind> {
        if classes.is_empty() {
            return Ok(true);
        }
        for &class in classes {
            if self.is_instance_of(exc, class)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Builds an exception of the built-in class for `kind` and raises it.
    pub fn raise_error(&mut self, kind: ErrorKind, message: &str) -> Unwind {
        let class = self.special.error(kind);
        let exc = self.new_exception(class, message);
        self.raise_value(exc)
    }

    /// Raises `exc`, capturing the current frame names as its stack trace
    /// if it has none yet.
    pub fn raise_value(&mut self, exc: Value) -> Unwind {
        let stack_trace = match self.heap.body::<Exception>(exc) {
            Ok(body) => body.stack_trace,
            Err(_) => {
                let found = self.type_name(exc);
                return self.raise_error(
                    ErrorKind::TypeError,
                    &format!("exceptions must derive from Exception, not {found}"),
                );
            }
        };
        if stack_trace.is_nil() {
            if let Err(err) = self.capture_stack_trace(exc) {
                return err;
            }
        }
        self.unwind_state = UnwindState::Unwinding;
        Unwind::Raise(exc)
    }

    fn capture_stack_trace(&mut self, exc: Value) -> Result<(), Unwind> {
        let names = self.frame_names();
        self.with_handles(|vm, hs| -> Result<(), Unwind> {
            hs.pin(vm, exc);
            let trace = vm.new_array(Vec::with_capacity(names.len()));
            hs.pin(vm, trace);
            for name in &names {
                let line = vm.new_string(name);
                vm.heap.body_mut::<Array>(trace)?.push(line);
            }
            vm.heap.body_mut::<Exception>(exc)?.stack_trace = trace;
            Ok(())
        })
    }

    /// Drops a caught exception that nobody will handle.
    pub fn discard_exception(&mut self, exc: Value, context: &str) {
        log::warn!(
            "{context}: discarding {}: {}",
            self.type_name(exc),
            self.exception_message(exc)
        );
        self.unwind_state = UnwindState::Running;
    }

    pub fn exception_message(&self, exc: Value) -> String {
        self.heap
            .try_body::<Exception>(exc)
            .and_then(|body| self.heap.try_body::<Str>(body.message))
            .map(|message| message.as_str().to_owned())
            .unwrap_or_default()
    }

    pub fn exception_context(&self, exc: Value) -> Option<Value> {
        self.heap
            .try_body::<Exception>(exc)
            .map(|body| body.context)
            .filter(|context| !context.is_nil())
    }

    pub fn stack_trace(&self, exc: Value) -> Vec<String> {
        let Some(trace) = self
            .heap
            .try_body::<Exception>(exc)
            .and_then(|body| self.heap.try_body::<Array>(body.stack_trace))
        else {
            return Vec::new();
        };
        trace
            .items()
            .iter()
            .filter_map(|&line| self.heap.try_body::<Str>(line))
            .map(|line| line.as_str().to_owned())
            .collect()
    }

    /// Top-level boundary: runs `body` in a [`FrameKind::Finish`] frame and
    /// reports how it ended instead of propagating.
    pub fn execute(&mut self, name: &str, body: impl FnOnce(&mut VM) -> Result<Value, Unwind>) -> Termination {
        match self.call_frame(FrameKind::Finish, name, Value::NIL, body) {
            Ok(value) => Termination::Completed(value),
            Err(Unwind::Raise(exc)) => {
                let class_name = self.type_name(exc);
                let message = self.exception_message(exc);
                let stack_trace = self.stack_trace(exc);
                let mut report = String::from("Traceback (most recent call last):");
                for frame in stack_trace.iter().rev() {
                    report.push_str("\n  in ");
                    report.push_str(frame);
                }
                log::error!("{report}\n{class_name}: {message}");
                self.unwind_state = UnwindState::Running;
                Termination::Unhandled {
                    class_name,
                    message,
                    stack_trace,
                }
            }
            Err(Unwind::Fatal(violation)) => {
                log::error!("aborting: {violation}");
                Termination::Aborted(violation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::heap::HeapSettings;

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn push(log: &Rc<RefCell<Vec<&'static str>>>, what: &'static str) -> impl FnOnce(&mut VM) -> Result<(), Unwind> + 'static {
        let log = Rc::clone(log);
        move |_| {
            log.borrow_mut().push(what);
            Ok(())
        }
    }

    #[test]
    fn cleanups_run_innermost_first_during_unwind() {
        let mut vm = VM::default();
        let order = log();
        let result: Result<(), Unwind> = vm.ensure(
            |vm| {
                vm.ensure(
                    |vm| Err(vm.raise_error(ErrorKind::ValueError, "boom")),
                    push(&order, "inner"),
                )
            },
            push(&order, "outer"),
        );
        assert!(matches!(result, Err(Unwind::Raise(_))));
        assert_eq!(*order.borrow(), vec!["inner", "outer"]);
        assert_eq!(vm.frame_depth(), 0);
        assert_eq!(vm.unwind_state(), UnwindState::Unwinding);
    }

    #[test]
    fn cleanups_registered_on_one_frame_run_in_reverse() {
        let mut vm = VM::default();
        let order = log();
        let (a, b) = (Rc::clone(&order), Rc::clone(&order));
        vm.call_frame(FrameKind::Native, "io", Value::NIL, |vm| {
            vm.add_cleanup(Value::from_i64(1), move |_, r| {
                assert_eq!(r, Value::from_i64(1));
                a.borrow_mut().push("first");
                Ok(())
            })?;
            vm.add_cleanup(Value::from_i64(2), move |_, _| {
                b.borrow_mut().push("second");
                Ok(())
            })?;
            Ok(())
        })
        .expect("frame");
        assert_eq!(*order.borrow(), vec!["second", "first"]);
    }

    #[test]
    fn rescue_selects_by_class() {
        let mut vm = VM::default();
        let value_error = vm.special.error(ErrorKind::ValueError);
        let key_error = vm.special.error(ErrorKind::KeyError);

        let caught = vm.rescue(
            &[key_error, value_error],
            |vm| Err(vm.raise_error(ErrorKind::ValueError, "bad value")),
            |vm, exc| {
                assert_eq!(vm.unwind_state(), UnwindState::Handled);
                Ok(vm.exception_message(exc))
            },
        );
        assert_eq!(caught, Ok("bad value".to_owned()));
        assert_eq!(vm.unwind_state(), UnwindState::Running);

        let missed: Result<(), Unwind> = vm.rescue(
            &[key_error],
            |vm| Err(vm.raise_error(ErrorKind::TypeError, "wrong")),
            |_, _| panic!("TypeError is not a KeyError"),
        );
        let exc = missed.expect_err("propagates").exception().expect("raised");
        assert_eq!(vm.class_of(exc), Ok(vm.special.error(ErrorKind::TypeError)));
        assert!(vm.unwind_targets().is_empty());
    }

    #[test]
    fn rescue_of_base_class_catches_subclasses() {
        let mut vm = VM::default();
        let base = vm.special.error(ErrorKind::Exception);
        let caught = vm.rescue(&[base], |vm| Err(vm.raise_error(ErrorKind::ZeroDivisionError, "x")), |_, _| Ok(1));
        assert_eq!(caught, Ok(1));
    }

    #[test]
    fn fatal_unwinds_are_never_rescued() {
        let mut vm = VM::default();
        let result: Result<(), Unwind> = vm.rescue(
            &[],
            |_| Err(InvariantViolation::CorruptedTable("test").into()),
            |_, _| panic!("fatal must not reach a handler"),
        );
        assert!(result.is_err_and(|e| e.is_fatal()));
    }

    #[test]
    fn raising_in_cleanup_replaces_and_chains() {
        let mut vm = VM::default();
        let result: Result<(), Unwind> = vm.ensure(
            |vm| Err(vm.raise_error(ErrorKind::KeyError, "first")),
            |vm| Err(vm.raise_error(ErrorKind::IOError, "second")),
        );
        let exc = result.expect_err("raised").exception().expect("exception");
        assert_eq!(vm.exception_message(exc), "second");
        let context = vm.exception_context(exc).expect("chained");
        assert_eq!(vm.exception_message(context), "first");
    }

    #[test]
    fn stack_trace_lists_frames_innermost_first() {
        let mut vm = VM::default();
        let result: Result<(), Unwind> = vm.call_frame(FrameKind::Package, "main", Value::NIL, |vm| {
            vm.call_frame(FrameKind::Method, "Foo#bar", Value::NIL, |vm| {
                Err(vm.raise_error(ErrorKind::NameError, "baz"))
            })
        });
        let exc = result.expect_err("raised").exception().expect("exception");
        assert_eq!(vm.stack_trace(exc), vec!["Foo#bar", "main"]);
    }

    #[test]
    fn execute_reports_unhandled_exceptions() {
        let mut vm = VM::default();
        let outcome = vm.execute("script", |vm| Err(vm.raise_error(ErrorKind::IndexError, "out of range")));
        assert_eq!(
            outcome,
            Termination::Unhandled {
                class_name: "IndexError".to_owned(),
                message: "out of range".to_owned(),
                stack_trace: vec!["script".to_owned()],
            }
        );
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(vm.unwind_state(), UnwindState::Running);

        let done = vm.execute("script", |_| Ok(Value::from_i64(3)));
        assert_eq!(done, Termination::Completed(Value::from_i64(3)));
        let aborted = vm.execute("script", |_| Err(InvariantViolation::NoActiveFrame.into()));
        assert_eq!(aborted, Termination::Aborted(InvariantViolation::NoActiveFrame));
    }

    #[test]
    fn add_cleanup_requires_a_frame() {
        let mut vm = VM::default();
        assert_eq!(
            vm.add_cleanup(Value::NIL, |_, _| Ok(())),
            Err(InvariantViolation::NoActiveFrame.into())
        );
    }

    #[test]
    fn in_flight_exceptions_survive_collection_in_cleanups() {
        let mut vm = VM::new(HeapSettings {
            stress: true,
            ..HeapSettings::default()
        });
        let result: Result<(), Unwind> = vm.ensure(
            |vm| Err(vm.raise_error(ErrorKind::ValueError, "kept")),
            |vm| {
                vm.collect_garbage();
                vm.new_string("garbage");
                Ok(())
            },
        );
        let exc = result.expect_err("raised").exception().expect("exception");
        assert!(vm.heap.is_live(exc));
        assert_eq!(vm.exception_message(exc), "kept");
    }

    #[test]
    fn normal_results_survive_collection_in_cleanups() {
        let mut vm = VM::new(HeapSettings {
            stress: true,
            ..HeapSettings::default()
        });
        let result = vm
            .ensure(
                |vm| Ok(vm.new_string("result")),
                |vm| {
                    vm.new_string("garbage");
                    Ok(())
                },
            )
            .expect("ensure");
        assert!(vm.heap.is_live(result));
        assert_eq!(vm.str_of(result), Ok("result"));

        let pair = vm
            .call_frame(FrameKind::Native, "pair", Value::NIL, |vm| {
                vm.add_cleanup(Value::NIL, |vm, _| {
                    vm.collect_garbage();
                    Ok(())
                })?;
                Ok(vm.with_handles(|vm, hs| {
                    let a = vm.new_float(1.0);
                    hs.pin(vm, a);
                    (a, Some(vm.new_float(2.0)))
                }))
            })
            .expect("frame");
        assert!(vm.heap.is_live(pair.0));
        assert!(pair.1.is_some_and(|b| vm.heap.is_live(b)));
    }

    #[test]
    fn rescue_in_an_outer_frame_runs_inner_cleanups_first() {
        let mut vm = VM::default();
        let order = log();
        let key_error = vm.special.error(ErrorKind::KeyError);
        let cleanup_log = Rc::clone(&order);
        let handler_log = Rc::clone(&order);

        let caught = vm.call_frame(FrameKind::Package, "main", Value::NIL, |vm| {
            vm.rescue(
                &[key_error],
                |vm| {
                    vm.call_frame(FrameKind::Method, "File#read", Value::NIL, |vm| -> Result<Value, Unwind> {
                        let resource = vm.new_string("handle");
                        vm.add_cleanup(resource, move |vm, resource| {
                            assert_eq!(vm.str_of(resource), Ok("handle"));
                            assert_eq!(vm.unwind_state(), UnwindState::Unwinding);
                            cleanup_log.borrow_mut().push("cleanup");
                            Ok(())
                        })?;
                        Err(vm.raise_error(ErrorKind::KeyError, "missing"))
                    })
                },
                move |vm, exc| {
                    assert_eq!(vm.unwind_state(), UnwindState::Handled);
                    assert_eq!(vm.frame_depth(), 1);
                    handler_log.borrow_mut().push("handler");
                    Ok(Value::from_i64(vm.exception_message(exc).len() as i64))
                },
            )
        });

        assert_eq!(caught, Ok(Value::from_i64(7)));
        assert_eq!(*order.borrow(), vec!["cleanup", "handler"]);
        assert_eq!(vm.unwind_state(), UnwindState::Running);
        assert_eq!(vm.frame_depth(), 0);
        assert!(vm.unwind_targets().is_empty());
    }

    #[test]
    fn raising_a_non_exception_is_a_type_error() {
        let mut vm = VM::default();
        let err = vm.raise_value(Value::from_i64(1));
        let exc = err.exception().expect("raised");
        assert_eq!(vm.class_of(exc), Ok(vm.special.error(ErrorKind::TypeError)));
    }
}
