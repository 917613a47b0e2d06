//! Self-contained units of work
//!
//! A [`WorkUnit`] carries everything one iteration needs: the task, the
//! number of positional arguments, whether to forward process info, the pool
//! size, and a flat list of argument slots (positional values first, then
//! keyword pairs). Units own their values and share nothing mutable, so any
//! worker can run any unit.
//!
//! The data part of a unit ([`UnitPayload`]) is serializable and names its
//! task. Within one process the task travels as a [`TaskRef`]; a payload that
//! crossed a process boundary is re-attached by name with
//! [`WorkUnit::resolve`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::plan::{pick, BroadcastPlan};
use crate::task::{ProcessInfo, TaskArgs, TaskError, TaskRef, TaskRegistry, PROCESS_INFO_KEY};
use crate::value::Value;

/// One argument slot of a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Slot {
    Positional(Value),
    Keyword(String, Value),
}

/// Everything in a unit except the task itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPayload {
    /// Name of the task, as registered in a [`TaskRegistry`]
    pub task: String,
    /// Iteration index; results are returned in this order
    pub iteration: usize,
    /// Number of leading positional slots
    pub positional_count: usize,
    /// Inject process identity info as `_pinfo`
    pub forward_info: bool,
    /// Pool size, used to reduce worker indices
    pub worker_count: usize,
    pub slots: Vec<Slot>,
}

impl UnitPayload {
    /// Split the slots back into positional and keyword arguments
    pub fn unpack(self) -> Result<TaskArgs, TaskError> {
        if self.positional_count > self.slots.len() {
            return Err(TaskError::MalformedUnit(format!(
                "{} positional arguments declared but only {} slots",
                self.positional_count,
                self.slots.len()
            )));
        }

        let mut positional = Vec::with_capacity(self.positional_count);
        let mut keyword = Vec::with_capacity(self.slots.len() - self.positional_count);

        for (i, slot) in self.slots.into_iter().enumerate() {
            match (i < self.positional_count, slot) {
                (true, Slot::Positional(v)) => positional.push(v),
                (false, Slot::Keyword(k, v)) => keyword.push((k, v)),
                (true, Slot::Keyword(k, _)) => {
                    return Err(TaskError::MalformedUnit(format!(
                        "keyword '{}' in positional slot {}",
                        k, i
                    )))
                }
                (false, Slot::Positional(_)) => {
                    return Err(TaskError::MalformedUnit(format!(
                        "positional value in keyword slot {}",
                        i
                    )))
                }
            }
        }

        Ok(TaskArgs::new(positional, keyword))
    }
}

/// A task plus one iteration's arguments
#[derive(Clone)]
pub struct WorkUnit {
    task: TaskRef,
    payload: UnitPayload,
}

impl WorkUnit {
    pub fn new(task: TaskRef, payload: UnitPayload) -> Self {
        Self { task, payload }
    }

    /// Re-attach a transferred payload to the task it names
    pub fn resolve(payload: UnitPayload, registry: &TaskRegistry) -> Result<Self, ConfigError> {
        let task = registry.resolve(&payload.task)?;
        Ok(Self { task, payload })
    }

    pub fn iteration(&self) -> usize {
        self.payload.iteration
    }

    pub fn task_name(&self) -> &str {
        self.task.name()
    }

    pub fn payload(&self) -> &UnitPayload {
        &self.payload
    }

    pub fn into_parts(self) -> (TaskRef, UnitPayload) {
        (self.task, self.payload)
    }

    /// Run the unit on behalf of a worker
    ///
    /// `worker` is the index of the executing worker and `invocation` the
    /// number of units it has run in this call, counting this one.
    pub fn execute(self, worker: usize, invocation: usize) -> Result<Value, TaskError> {
        let forward_info = self.payload.forward_info;
        let worker_count = self.payload.worker_count.max(1);
        let mut args = self.payload.unpack()?;

        if forward_info {
            let info = ProcessInfo {
                worker: worker % worker_count,
                invocation,
            };
            args = TaskArgs::new(
                args.positional().to_vec(),
                args.keyword()
                    .iter()
                    .filter(|(k, _)| k != PROCESS_INFO_KEY)
                    .cloned()
                    .chain(std::iter::once((PROCESS_INFO_KEY.to_string(), info.to_value())))
                    .collect(),
            );
        }

        self.task.call(args)
    }
}

impl fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkUnit")
            .field("task", &self.task.name())
            .field("payload", &self.payload)
            .finish()
    }
}

/// Build one unit per iteration of a broadcast plan
///
/// Unit `j` takes element `min(j, len - 1)` of every argument sequence.
pub fn pack(
    task: &TaskRef,
    plan: &BroadcastPlan,
    forward_info: bool,
    worker_count: usize,
) -> Vec<WorkUnit> {
    (0..plan.n())
        .map(|j| {
            let slots = plan
                .positional()
                .iter()
                .map(|seq| Slot::Positional(pick(seq, j)))
                .chain(
                    plan.keyword()
                        .iter()
                        .map(|(key, seq)| Slot::Keyword(key.clone(), pick(seq, j))),
                )
                .collect();

            WorkUnit::new(
                task.clone(),
                UnitPayload {
                    task: task.name().to_string(),
                    iteration: j,
                    positional_count: plan.positional().len(),
                    forward_info,
                    worker_count,
                    slots,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputPolicy;
    use crate::plan::{plan, CallArgs};
    use crate::task::TaskFn;

    fn add() -> TaskRef {
        TaskFn::arc("add", |args: TaskArgs| {
            Ok(Value::Int(args.int(0, "a")? + args.int_or(1, "b", 1)?))
        })
    }

    fn payload(positional_count: usize, slots: Vec<Slot>) -> UnitPayload {
        UnitPayload {
            task: "add".to_string(),
            iteration: 0,
            positional_count,
            forward_info: false,
            worker_count: 2,
            slots,
        }
    }

    #[test]
    fn test_pack_layout() {
        let args = CallArgs::new().arg(vec![1, 2, 3]).kwarg("b", 10);
        let plan = plan(args, None, &InputPolicy::none(), false);
        let units = pack(&add(), &plan, false, 2);

        assert_eq!(units.len(), 3);
        let p = units[2].payload();
        assert_eq!(p.task, "add");
        assert_eq!(p.iteration, 2);
        assert_eq!(p.positional_count, 1);
        assert_eq!(p.worker_count, 2);
        assert_eq!(
            p.slots,
            vec![
                Slot::Positional(Value::Int(3)),
                Slot::Keyword("b".into(), Value::Int(10)),
            ]
        );
    }

    #[test]
    fn test_execute_units_in_any_order() {
        let args = CallArgs::new().arg(vec![1, 2, 3]).kwarg("b", 10);
        let plan = plan(args, None, &InputPolicy::none(), false);
        let mut units = pack(&add(), &plan, false, 2);
        units.reverse();

        let results: Vec<_> = units
            .into_iter()
            .map(|u| (u.iteration(), u.execute(0, 1).unwrap()))
            .collect();
        assert_eq!(
            results,
            vec![(2, Value::Int(13)), (1, Value::Int(12)), (0, Value::Int(11))]
        );
    }

    #[test]
    fn test_execute_forwards_process_info() {
        let task = TaskFn::arc("pinfo", |args: TaskArgs| {
            let info = args
                .process_info()
                .ok_or_else(|| TaskError::failed("no process info"))?;
            Ok(info.to_value())
        });
        let unit = WorkUnit::new(
            task,
            UnitPayload {
                task: "pinfo".to_string(),
                iteration: 0,
                positional_count: 0,
                forward_info: true,
                worker_count: 2,
                slots: vec![],
            },
        );

        // Worker index is reduced modulo the pool size
        assert_eq!(
            unit.execute(3, 5).unwrap(),
            Value::from(vec![Value::Int(1), Value::Int(5)])
        );
    }

    #[test]
    fn test_unpack_splits_on_positional_count() {
        let args = payload(
            1,
            vec![
                Slot::Positional(Value::Int(1)),
                Slot::Keyword("b".into(), Value::Int(1)),
            ],
        )
        .unpack()
        .unwrap();

        assert_eq!(args.positional(), &[Value::Int(1)]);
        assert_eq!(args.kwarg("b"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_unpack_rejects_malformed() {
        assert!(matches!(
            payload(2, vec![Slot::Positional(Value::Int(1))]).unpack(),
            Err(TaskError::MalformedUnit(_))
        ));
        assert!(matches!(
            payload(1, vec![Slot::Keyword("a".into(), Value::Int(1))]).unpack(),
            Err(TaskError::MalformedUnit(_))
        ));
        assert!(matches!(
            payload(0, vec![Slot::Positional(Value::Int(1))]).unpack(),
            Err(TaskError::MalformedUnit(_))
        ));
    }

    #[test]
    fn test_task_error_propagates() {
        let unit = WorkUnit::new(add(), payload(0, vec![]));
        assert_eq!(
            unit.execute(0, 1),
            Err(TaskError::MissingArgument("a".to_string()))
        );
    }

    #[test]
    fn test_payload_transfers_through_registry() {
        let args = CallArgs::new().arg(vec![1, 2]).kwarg("b", 10);
        let plan = plan(args, None, &InputPolicy::none(), false);
        let units = pack(&add(), &plan, false, 2);

        let mut registry = TaskRegistry::new();
        registry.register(add());

        let results: Vec<Value> = units
            .into_iter()
            .map(|unit| {
                let (_, payload) = unit.into_parts();
                let wire = serde_json::to_string(&payload).unwrap();
                assert!(wire.contains(r#""task":"add""#));

                let back: UnitPayload = serde_json::from_str(&wire).unwrap();
                assert_eq!(back, payload);
                let unit = WorkUnit::resolve(back, &registry).unwrap();
                assert_eq!(unit.task_name(), "add");
                unit.execute(0, 1).unwrap()
            })
            .collect();
        assert_eq!(results, vec![Value::Int(11), Value::Int(12)]);
    }

    #[test]
    fn test_resolve_unknown_task() {
        let mut p = payload(0, vec![]);
        p.task = "missing".to_string();
        assert_eq!(
            WorkUnit::resolve(p, &TaskRegistry::new()).unwrap_err(),
            ConfigError::NotInvocable("missing".to_string())
        );
    }
}
