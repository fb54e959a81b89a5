//! Dependency resolution
//!
//! Turns a set of requested task ids into a linear execution plan and
//! checks the plan for cycles.
//!
//! The flattening walk appends a dependency as soon as it is reached and
//! only then descends into that dependency's own deps. For `T -> A -> A1`
//! the plan is `[A, A1, T]`: a dependency can precede its own transitive
//! dependencies once the graph is deeper than one level. Existing task files
//! rely on this order, so it is kept as is.

use crate::error::{ResolveError, ResolveResult};
use crate::runner::{EventBus, Event, Task, TaskRegistry};
use std::collections::HashSet;
use std::sync::Arc;

/// Resolve the requested tasks into an ordered, de-duplicated plan
///
/// Every failure is published on `events` before it is returned.
pub fn resolve<S: AsRef<str>>(
    requested: &[S],
    registry: &TaskRegistry,
    events: &EventBus,
) -> ResolveResult<Vec<Arc<Task>>> {
    let mut plan: Vec<Arc<Task>> = Vec::new();

    for id in requested {
        let id = id.as_ref();
        let task = registry.get(id).ok_or_else(|| {
            events.publish(&Event::TaskNotFound {
                task_id: id.to_string(),
                required_by: None,
            });
            ResolveError::TaskNotFound(id.to_string())
        })?;

        flatten(task, registry, &mut plan, events)?;

        if !contains(&plan, &task.id) {
            plan.push(Arc::clone(task));
        }
    }

    // A dependency missing from the plan is reported as not found, but
    // aborts the run exactly like a cycle does.
    detect_cyclical_deps(&plan, events)?;

    tracing::debug!(
        plan = ?plan.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
        "Resolved execution plan"
    );

    Ok(plan)
}

/// Depth-first walk over `task`'s dependencies, appending as it goes
fn flatten(
    task: &Arc<Task>,
    registry: &TaskRegistry,
    plan: &mut Vec<Arc<Task>>,
    events: &EventBus,
) -> ResolveResult<()> {
    for dep_id in &task.deps {
        let dep = registry.get(dep_id).ok_or_else(|| {
            events.publish(&Event::TaskNotFound {
                task_id: dep_id.clone(),
                required_by: Some(task.id.clone()),
            });
            ResolveError::MissingDependency {
                task: task.id.clone(),
                dependency: dep_id.clone(),
            }
        })?;

        // Only newly added tasks are descended into; this is what stops the
        // walk on cyclic graphs.
        if !contains(plan, &dep.id) {
            plan.push(Arc::clone(dep));
            flatten(dep, registry, plan, events)?;
        }
    }

    Ok(())
}

/// Check a resolved plan for dependency cycles
///
/// Dependencies are looked up in the plan itself, not the registry. A
/// dependency that is not in the plan is published as `TaskNotFound` and
/// fails the check.
pub fn detect_cyclical_deps(plan: &[Arc<Task>], events: &EventBus) -> ResolveResult<()> {
    let mut acyclic = HashSet::new();
    let mut stack = Vec::new();

    for task in plan {
        check_task_cycle(task, plan, &mut acyclic, &mut stack, events)?;
    }

    Ok(())
}

fn check_task_cycle(
    task: &Task,
    plan: &[Arc<Task>],
    acyclic: &mut HashSet<String>,
    stack: &mut Vec<String>,
    events: &EventBus,
) -> ResolveResult<()> {
    if stack.contains(&task.id) {
        let mut path = stack.clone();
        path.push(task.id.clone());
        events.publish(&Event::CycleDetected { path: path.clone() });
        return Err(ResolveError::CircularDependency(path.join(" -> ")));
    }

    if acyclic.contains(&task.id) {
        return Ok(());
    }

    stack.push(task.id.clone());

    for dep_id in &task.deps {
        let dep = plan.iter().find(|t| &t.id == dep_id).ok_or_else(|| {
            events.publish(&Event::TaskNotFound {
                task_id: dep_id.clone(),
                required_by: Some(task.id.clone()),
            });
            ResolveError::TaskNotFound(dep_id.clone())
        })?;

        check_task_cycle(dep, plan, acyclic, stack, events)?;
    }

    stack.pop();
    acyclic.insert(task.id.clone());

    Ok(())
}

fn contains(plan: &[Arc<Task>], id: &str) -> bool {
    plan.iter().any(|t| t.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::EventRecorder;
    use pretty_assertions::assert_eq;

    fn registry(graph: &[(&str, &[&str])]) -> TaskRegistry {
        graph
            .iter()
            .map(|(id, deps)| Task::builder(*id).deps(deps.iter().copied()).build())
            .collect()
    }

    fn ids(plan: &[Arc<Task>]) -> Vec<&str> {
        plan.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_single_task_without_deps() {
        let reg = registry(&[("hello", &[])]);
        let plan = resolve(&["hello"], &reg, &EventBus::new()).unwrap();
        assert_eq!(ids(&plan), vec!["hello"]);
    }

    #[test]
    fn test_dependency_precedes_its_own_deps() {
        let reg = registry(&[("t", &["a"]), ("a", &["a1"]), ("a1", &[])]);
        let plan = resolve(&["t"], &reg, &EventBus::new()).unwrap();
        assert_eq!(ids(&plan), vec!["a", "a1", "t"]);
    }

    #[test]
    fn test_shared_dependency_appears_once() {
        let reg = registry(&[
            ("release", &["build", "test"]),
            ("build", &["fetch"]),
            ("test", &["fetch", "build"]),
            ("fetch", &[]),
        ]);
        let plan = resolve(&["release", "test"], &reg, &EventBus::new()).unwrap();
        assert_eq!(ids(&plan), vec!["build", "fetch", "test", "release"]);
    }

    #[test]
    fn test_requested_task_already_pulled_in_as_dependency() {
        let reg = registry(&[("app", &["lib"]), ("lib", &[])]);
        let plan = resolve(&["app", "lib"], &reg, &EventBus::new()).unwrap();
        assert_eq!(ids(&plan), vec!["lib", "app"]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let reg = registry(&[
            ("deploy", &["package", "migrate"]),
            ("package", &["build"]),
            ("migrate", &["build"]),
            ("build", &[]),
        ]);
        let events = EventBus::new();
        let first = resolve(&["deploy"], &reg, &events).unwrap();
        let second = resolve(&["deploy"], &reg, &events).unwrap();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_unknown_requested_task() {
        let recorder = Arc::new(EventRecorder::new());
        let events = EventBus::new().with_handler(recorder.clone());
        let reg = registry(&[("a", &[])]);

        let result = resolve(&["missing"], &reg, &events);
        assert_eq!(
            result.unwrap_err(),
            ResolveError::TaskNotFound("missing".to_string())
        );
        assert!(matches!(
            recorder.events().as_slice(),
            [Event::TaskNotFound { task_id, required_by: None }] if task_id == "missing"
        ));
    }

    #[test]
    fn test_missing_dependency() {
        let recorder = Arc::new(EventRecorder::new());
        let events = EventBus::new().with_handler(recorder.clone());
        let reg = registry(&[("x", &["z"])]);

        let result = resolve(&["x"], &reg, &events);
        assert_eq!(
            result.unwrap_err(),
            ResolveError::MissingDependency {
                task: "x".to_string(),
                dependency: "z".to_string(),
            }
        );
        assert!(matches!(
            recorder.events().as_slice(),
            [Event::TaskNotFound { task_id, required_by: Some(by) }] if task_id == "z" && by == "x"
        ));
    }

    #[test]
    fn test_two_task_cycle() {
        let recorder = Arc::new(EventRecorder::new());
        let events = EventBus::new().with_handler(recorder.clone());
        let reg = registry(&[("x", &["y"]), ("y", &["x"])]);

        let result = resolve(&["x"], &reg, &events);
        assert!(matches!(result, Err(ResolveError::CircularDependency(_))));

        let cycles: Vec<Vec<String>> = recorder
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::CycleDetected { path } => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(cycles, vec![vec!["y", "x", "y"]]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let reg = registry(&[("loop", &["loop"])]);
        let result = resolve(&["loop"], &reg, &EventBus::new());
        assert_eq!(
            result.unwrap_err(),
            ResolveError::CircularDependency("loop -> loop".to_string())
        );
    }

    #[test]
    fn test_cycle_check_reports_dependency_outside_plan() {
        let recorder = Arc::new(EventRecorder::new());
        let events = EventBus::new().with_handler(recorder.clone());
        let plan = vec![Arc::new(Task::builder("a").dep("b").build())];

        let result = detect_cyclical_deps(&plan, &events);
        assert_eq!(result.unwrap_err(), ResolveError::TaskNotFound("b".to_string()));
        assert_eq!(recorder.events().len(), 1);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let reg = registry(&[
            ("top", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);
        let plan = resolve(&["top"], &reg, &EventBus::new()).unwrap();
        assert_eq!(ids(&plan), vec!["left", "base", "right", "top"]);
    }
}
