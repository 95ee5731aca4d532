//! Task wiring
//!
//! The compatibility check is a named task registered as a dependency of the
//! `check` verification task, so running `check` runs it first. Tasks form a
//! [`TaskGraph`] that is executed in dependency order.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use serde::Serialize;
use tracing::info;

use crate::compatibility::CompatibilityChecker;
use crate::config::CompatConfig;
use crate::error::{CompatError, Result};
use crate::evaluator::{CheckReport, Evaluator};
use crate::loader::{SchemaLoader, SchemaSet};
use crate::resolver::{FileSetResolver, FileSets};

pub const COMPATIBILITY_CHECK_TASK_NAME: &str = "avroCompatibilityCheck";
pub const CHECK_TASK_NAME: &str = "check";

/// Result of running one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Nothing to compare against
    Skipped,
    Passed(CheckReport),
    /// A lifecycle task whose dependencies all ran
    Completed,
}

/// A unit of work in the task graph
pub trait Task {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn run(&self) -> Result<TaskOutcome>;
}

/// Task with no action of its own, only dependencies
pub struct LifecycleTask {
    name: String,
    description: String,
}

impl LifecycleTask {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

impl Task for LifecycleTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self) -> Result<TaskOutcome> {
        Ok(TaskOutcome::Completed)
    }
}

enum Inputs {
    Files(FileSets),
    /// Resolved only when the task runs
    Deferred {
        config: CompatConfig,
        project_dir: PathBuf,
        against_paths: Vec<PathBuf>,
    },
}

/// Loads both file sets and evaluates them
pub struct CompatibilityTask {
    inputs: Inputs,
    loader: SchemaLoader,
    evaluator: Evaluator,
}

impl CompatibilityTask {
    /// Task over already known file sets
    pub fn new(files: FileSets, loader: SchemaLoader, checker: CompatibilityChecker) -> Self {
        Self {
            inputs: Inputs::Files(files),
            loader,
            evaluator: Evaluator::new(checker),
        }
    }

    /// Task whose file sets are resolved from `config` at run time
    pub fn from_config(config: CompatConfig, project_dir: impl Into<PathBuf>, against_paths: Vec<PathBuf>) -> Self {
        let loader = config.loader();
        let evaluator = Evaluator::new(config.checker());
        Self {
            inputs: Inputs::Deferred {
                config,
                project_dir: project_dir.into(),
                against_paths,
            },
            loader,
            evaluator,
        }
    }

    fn files(&self) -> Result<FileSets> {
        match &self.inputs {
            Inputs::Files(files) => Ok(files.clone()),
            Inputs::Deferred {
                config,
                project_dir,
                against_paths,
            } => FileSetResolver::new(config, project_dir)
                .with_against_paths(against_paths.iter().cloned())
                .resolve(),
        }
    }

    fn load(&self, label: &str, files: &[PathBuf]) -> Result<SchemaSet> {
        let set = self.loader.load(files)?;
        info!(
            "parsed {} schemas: [{}]",
            label,
            set.names().collect::<Vec<_>>().join(", ")
        );
        Ok(set)
    }
}

impl Task for CompatibilityTask {
    fn name(&self) -> &str {
        COMPATIBILITY_CHECK_TASK_NAME
    }

    fn description(&self) -> &str {
        "Checks that avro schemas are compatible with the previously published ones"
    }

    fn run(&self) -> Result<TaskOutcome> {
        let files = self.files()?;
        if files.against.is_empty() {
            info!("no against schemas; skipping {}", COMPATIBILITY_CHECK_TASK_NAME);
            return Ok(TaskOutcome::Skipped);
        }

        let source = self.load("source", &files.source)?;
        let against = self.load("against", &files.against)?;
        let report = self.evaluator.check(&source, &against)?;
        info!("{}: {}", COMPATIBILITY_CHECK_TASK_NAME, report.summary());
        Ok(TaskOutcome::Passed(report))
    }
}

/// Named tasks with dependency edges
#[derive(Default)]
pub struct TaskGraph {
    graph: DiGraph<Box<dyn Task>, ()>,
    index: HashMap<String, NodeIndex>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Box<dyn Task>) -> Result<()> {
        let name = task.name().to_string();
        if self.index.contains_key(&name) {
            return Err(CompatError::TaskGraph(format!("task {} is already registered", name)));
        }
        let node = self.graph.add_node(task);
        self.index.insert(name, node);
        Ok(())
    }

    /// Make `task` run after `dependency`
    pub fn depends_on(&mut self, task: &str, dependency: &str) -> Result<()> {
        let task = self.node(task)?;
        let dependency = self.node(dependency)?;
        self.graph.update_edge(dependency, task, ());
        Ok(())
    }

    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    fn node(&self, name: &str) -> Result<NodeIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| CompatError::TaskGraph(format!("unknown task {}", name)))
    }

    /// `target` and everything it depends on, in execution order
    pub fn execution_plan(&self, target: &str) -> Result<Vec<&str>> {
        let target = self.node(target)?;

        let mut needed = HashSet::new();
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, target);
        while let Some(node) = dfs.next(reversed) {
            needed.insert(node);
        }

        let order = toposort(&self.graph, None).map_err(|cycle| {
            CompatError::TaskGraph(format!(
                "dependency cycle involving task {}",
                self.graph[cycle.node_id()].name()
            ))
        })?;

        Ok(order
            .into_iter()
            .filter(|node| needed.contains(node))
            .map(|node| self.graph[node].name())
            .collect())
    }

    /// Run `target` after its dependencies; the first failure stops the run
    pub fn run(&self, target: &str) -> Result<Vec<(String, TaskOutcome)>> {
        let mut outcomes = Vec::new();
        for name in self.execution_plan(target)? {
            let task = &self.graph[self.node(name)?];
            info!("> Task :{}", name);
            outcomes.push((name.to_string(), task.run()?));
        }
        Ok(outcomes)
    }
}

/// The verification lifecycle: `check` depending on the compatibility task
pub fn verification_graph(task: CompatibilityTask) -> Result<TaskGraph> {
    let mut graph = TaskGraph::new();
    graph.register(Box::new(LifecycleTask::new(CHECK_TASK_NAME, "Runs all verification tasks")))?;
    graph.register(Box::new(task))?;
    graph.depends_on(CHECK_TASK_NAME, COMPATIBILITY_CHECK_TASK_NAME)?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct Recording {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Task for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn run(&self) -> Result<TaskOutcome> {
            self.log.borrow_mut().push(self.name);
            Ok(TaskOutcome::Completed)
        }
    }

    #[test]
    fn test_dependencies_run_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut graph = TaskGraph::new();
        for name in ["check", "compile", "lint", "unrelated"] {
            graph
                .register(Box::new(Recording { name, log: log.clone() }))
                .unwrap();
        }
        graph.depends_on("check", "lint").unwrap();
        graph.depends_on("lint", "compile").unwrap();

        graph.run("check").unwrap();
        assert_eq!(*log.borrow(), vec!["compile", "lint", "check"]);
    }

    #[test]
    fn test_cycles_and_unknown_tasks_rejected() {
        let mut graph = TaskGraph::new();
        graph.register(Box::new(LifecycleTask::new("a", ""))).unwrap();
        graph.register(Box::new(LifecycleTask::new("b", ""))).unwrap();
        assert!(graph.register(Box::new(LifecycleTask::new("a", ""))).is_err());
        assert!(graph.depends_on("a", "missing").is_err());

        graph.depends_on("a", "b").unwrap();
        graph.depends_on("b", "a").unwrap();
        assert!(matches!(graph.execution_plan("a"), Err(CompatError::TaskGraph(_))));
    }

    #[test]
    fn test_check_runs_compatibility_task() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("order.avdl");
        fs::write(&source, r#"@namespace("com.x") protocol P { record Order { int id; } }"#).unwrap();

        let files = FileSets {
            source: vec![source.clone()],
            against: vec![source],
        };
        let task = CompatibilityTask::new(files, SchemaLoader::new(), CompatibilityChecker::default());
        let graph = verification_graph(task).unwrap();

        assert_eq!(
            graph.execution_plan(CHECK_TASK_NAME).unwrap(),
            vec![COMPATIBILITY_CHECK_TASK_NAME, CHECK_TASK_NAME]
        );
        let outcomes = graph.run(CHECK_TASK_NAME).unwrap();
        match &outcomes[0].1 {
            TaskOutcome::Passed(report) => assert_eq!(report.compatible, vec!["com.x.Order"]),
            other => panic!("expected pass, got {:?}", other),
        }
        assert_eq!(outcomes[1].1, TaskOutcome::Completed);
    }

    #[test]
    fn test_empty_against_skips() {
        let task = CompatibilityTask::new(
            FileSets::default(),
            SchemaLoader::new(),
            CompatibilityChecker::default(),
        );
        assert_eq!(task.run().unwrap(), TaskOutcome::Skipped);
    }
}
