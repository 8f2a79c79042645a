//! Version-adaptive command construction.
//!
//! Every logical operation has one or more command variants, each usable
//! since some backend version. Once the backend version is negotiated the
//! newest compatible variant is used.

use crate::context::ContextId;
use crate::error::FactoryError;
use crate::mi::{Command, Dialect};
use crate::version::Version;
use itertools::Itertools;
use std::sync::{Arc, OnceLock};
use strum_macros::{Display, IntoStaticStr};

/// Backend descriptor, known after negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub version: Version,
    /// Result of `-list-features`, empty for backends without it.
    pub features: Vec<String>,
}

impl BackendInfo {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            features: vec![],
        }
    }

    /// `--thread` and `--frame` options of MI commands.
    pub fn supports_thread_frame_options(&self) -> bool {
        self.version >= Version::new(7, 0, 0)
    }

    /// `-interpreter-exec console` command.
    pub fn supports_console_interpreter(&self) -> bool {
        // present in every backend with MI2
        true
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| f == name)
    }

    pub fn dialect(&self) -> Dialect {
        Dialect {
            thread_frame_options: self.supports_thread_frame_options(),
            console_interpreter: self.supports_console_interpreter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendState {
    NotNegotiated,
    Negotiated(BackendInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchKind {
    #[default]
    Write,
    Read,
    Access,
}

/// How `-stack-list-locals` prints values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintValues {
    #[default]
    NoValues,
    AllValues,
    SimpleValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Breakpoint {
    pub location: String,
    pub temporary: bool,
    pub hardware: bool,
    pub condition: Option<String>,
    pub ignore_count: Option<u32>,
}

/// Logical backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    ExecRun,
    ExecContinue { all: bool, reverse: bool },
    ExecInterrupt { all: bool },
    ExecNext { reverse: bool },
    ExecStep { reverse: bool },
    ExecFinish { reverse: bool },
    ExecNextInstruction { reverse: bool },
    ExecStepInstruction { reverse: bool },
    BreakInsert(Breakpoint),
    BreakDelete(Vec<u32>),
    BreakEnable(Vec<u32>),
    BreakDisable(Vec<u32>),
    BreakList,
    BreakCondition { number: u32, condition: String },
    BreakWatch { expression: String, kind: WatchKind },
    StackListFrames { range: Option<(u32, u32)> },
    StackInfoDepth { max_depth: Option<u32> },
    StackListLocals(PrintValues),
    StackSelectFrame(u32),
    ThreadInfo(Option<u32>),
    ThreadSelect(u32),
    ListThreadGroups,
    DataEvaluateExpression(String),
    DataReadMemory { address: String, count: usize },
    DataListRegisterNames,
    GdbSet { name: String, value: String },
    GdbExit,
    GdbVersion,
    ListFeatures,
    EnablePrettyPrinting,
    TargetSelectRemote(String),
    FileExecAndSymbols(String),
    Console(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum OperationKind {
    ExecRun,
    ExecContinue,
    ExecInterrupt,
    ExecNext,
    ExecStep,
    ExecFinish,
    ExecNextInstruction,
    ExecStepInstruction,
    BreakInsert,
    BreakDelete,
    BreakEnable,
    BreakDisable,
    BreakList,
    BreakCondition,
    BreakWatch,
    StackListFrames,
    StackInfoDepth,
    StackListLocals,
    StackSelectFrame,
    ThreadInfo,
    ThreadSelect,
    ListThreadGroups,
    DataEvaluateExpression,
    DataReadMemory,
    DataListRegisterNames,
    GdbSet,
    GdbExit,
    GdbVersion,
    ListFeatures,
    EnablePrettyPrinting,
    TargetSelectRemote,
    FileExecAndSymbols,
    Console,
}

impl OperationKind {
    /// Operation allowed before negotiation.
    pub fn is_probe(self) -> bool {
        matches!(self, OperationKind::GdbVersion)
    }

    /// Operation without side effects, commands of this kind may be coalesced.
    pub fn is_query(self) -> bool {
        matches!(
            self,
            OperationKind::BreakList
                | OperationKind::StackListFrames
                | OperationKind::StackInfoDepth
                | OperationKind::ThreadInfo
                | OperationKind::ListThreadGroups
                | OperationKind::DataListRegisterNames
                | OperationKind::GdbVersion
                | OperationKind::ListFeatures
        )
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ExecRun => OperationKind::ExecRun,
            Operation::ExecContinue { .. } => OperationKind::ExecContinue,
            Operation::ExecInterrupt { .. } => OperationKind::ExecInterrupt,
            Operation::ExecNext { .. } => OperationKind::ExecNext,
            Operation::ExecStep { .. } => OperationKind::ExecStep,
            Operation::ExecFinish { .. } => OperationKind::ExecFinish,
            Operation::ExecNextInstruction { .. } => OperationKind::ExecNextInstruction,
            Operation::ExecStepInstruction { .. } => OperationKind::ExecStepInstruction,
            Operation::BreakInsert(_) => OperationKind::BreakInsert,
            Operation::BreakDelete(_) => OperationKind::BreakDelete,
            Operation::BreakEnable(_) => OperationKind::BreakEnable,
            Operation::BreakDisable(_) => OperationKind::BreakDisable,
            Operation::BreakList => OperationKind::BreakList,
            Operation::BreakCondition { .. } => OperationKind::BreakCondition,
            Operation::BreakWatch { .. } => OperationKind::BreakWatch,
            Operation::StackListFrames { .. } => OperationKind::StackListFrames,
            Operation::StackInfoDepth { .. } => OperationKind::StackInfoDepth,
            Operation::StackListLocals(_) => OperationKind::StackListLocals,
            Operation::StackSelectFrame(_) => OperationKind::StackSelectFrame,
            Operation::ThreadInfo(_) => OperationKind::ThreadInfo,
            Operation::ThreadSelect(_) => OperationKind::ThreadSelect,
            Operation::ListThreadGroups => OperationKind::ListThreadGroups,
            Operation::DataEvaluateExpression(_) => OperationKind::DataEvaluateExpression,
            Operation::DataReadMemory { .. } => OperationKind::DataReadMemory,
            Operation::DataListRegisterNames => OperationKind::DataListRegisterNames,
            Operation::GdbSet { .. } => OperationKind::GdbSet,
            Operation::GdbExit => OperationKind::GdbExit,
            Operation::GdbVersion => OperationKind::GdbVersion,
            Operation::ListFeatures => OperationKind::ListFeatures,
            Operation::EnablePrettyPrinting => OperationKind::EnablePrettyPrinting,
            Operation::TargetSelectRemote(_) => OperationKind::TargetSelectRemote,
            Operation::FileExecAndSymbols(_) => OperationKind::FileExecAndSymbols,
            Operation::Console(_) => OperationKind::Console,
        }
    }
}

type Builder = fn(&Operation, Version) -> Result<Command, FactoryError>;

/// Command variant of an operation usable since `since` backend version.
struct Capability {
    kind: OperationKind,
    since: Version,
    build: Builder,
}

const V6_8: Version = Version::new(6, 8, 0);
const V7_0: Version = Version::new(7, 0, 0);
const V7_2: Version = Version::new(7, 2, 0);

macro_rules! cap {
    ($kind: ident, $since: expr, $build: expr) => {
        Capability {
            kind: OperationKind::$kind,
            since: $since,
            build: $build,
        }
    };
}

static CAPABILITIES: &[Capability] = &[
    cap!(ExecRun, V6_8, build_plain),
    cap!(ExecContinue, V6_8, build_exec_legacy),
    cap!(ExecContinue, V7_0, build_exec),
    cap!(ExecInterrupt, V6_8, build_exec_legacy),
    cap!(ExecInterrupt, V7_0, build_exec),
    cap!(ExecNext, V6_8, build_exec_legacy),
    cap!(ExecNext, V7_0, build_exec),
    cap!(ExecStep, V6_8, build_exec_legacy),
    cap!(ExecStep, V7_0, build_exec),
    cap!(ExecFinish, V6_8, build_exec_legacy),
    cap!(ExecFinish, V7_0, build_exec),
    cap!(ExecNextInstruction, V6_8, build_exec_legacy),
    cap!(ExecNextInstruction, V7_0, build_exec),
    cap!(ExecStepInstruction, V6_8, build_exec_legacy),
    cap!(ExecStepInstruction, V7_0, build_exec),
    cap!(BreakInsert, V6_8, build_break_insert),
    cap!(BreakDelete, V6_8, build_break_numbers),
    cap!(BreakEnable, V6_8, build_break_numbers),
    cap!(BreakDisable, V6_8, build_break_numbers),
    cap!(BreakList, V6_8, build_plain),
    cap!(BreakCondition, V6_8, build_break_condition),
    cap!(BreakWatch, V6_8, build_break_watch),
    cap!(StackListFrames, V6_8, build_stack),
    cap!(StackInfoDepth, V6_8, build_stack),
    cap!(StackListLocals, V6_8, build_stack),
    cap!(StackSelectFrame, V6_8, build_stack),
    cap!(ThreadInfo, V6_8, build_thread_list_ids),
    cap!(ThreadInfo, V7_0, build_thread_info),
    cap!(ThreadSelect, V6_8, build_thread_select),
    cap!(ListThreadGroups, V7_0, build_plain),
    cap!(DataEvaluateExpression, V6_8, build_evaluate),
    cap!(DataReadMemory, V6_8, build_read_memory_legacy),
    cap!(DataReadMemory, V7_2, build_read_memory),
    cap!(DataListRegisterNames, V6_8, build_plain),
    cap!(GdbSet, V6_8, build_gdb_set),
    cap!(GdbExit, V6_8, build_plain),
    cap!(GdbVersion, V6_8, build_plain),
    cap!(ListFeatures, V7_2, build_plain),
    cap!(EnablePrettyPrinting, V7_0, build_plain),
    cap!(TargetSelectRemote, V6_8, build_path_like),
    cap!(FileExecAndSymbols, V6_8, build_path_like),
    cap!(Console, V6_8, build_console),
];

/// Commands without arguments.
fn build_plain(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let name = match op {
        Operation::ExecRun => "exec-run",
        Operation::BreakList => "break-list",
        Operation::ListThreadGroups => "list-thread-groups",
        Operation::DataListRegisterNames => "data-list-register-names",
        Operation::GdbExit => "gdb-exit",
        Operation::GdbVersion => "gdb-version",
        Operation::ListFeatures => "list-features",
        Operation::EnablePrettyPrinting => "enable-pretty-printing",
        _ => unreachable!(),
    };
    Ok(Command::mi(name))
}

fn exec_operation_name(op: &Operation) -> (&'static str, bool) {
    match op {
        Operation::ExecContinue { reverse, .. } => ("exec-continue", *reverse),
        Operation::ExecInterrupt { .. } => ("exec-interrupt", false),
        Operation::ExecNext { reverse } => ("exec-next", *reverse),
        Operation::ExecStep { reverse } => ("exec-step", *reverse),
        Operation::ExecFinish { reverse } => ("exec-finish", *reverse),
        Operation::ExecNextInstruction { reverse } => ("exec-next-instruction", *reverse),
        Operation::ExecStepInstruction { reverse } => ("exec-step-instruction", *reverse),
        _ => ("exec-run", false),
    }
}

fn all_threads(op: &Operation) -> bool {
    matches!(
        op,
        Operation::ExecContinue { all: true, .. } | Operation::ExecInterrupt { all: true }
    )
}

/// Exec commands of backends without non-stop mode and reverse execution.
fn build_exec_legacy(op: &Operation, version: Version) -> Result<Command, FactoryError> {
    let (name, reverse) = exec_operation_name(op);
    if reverse || all_threads(op) {
        return Err(FactoryError::Unsupported {
            operation: op.kind(),
            version,
        });
    }
    Ok(Command::mi(name))
}

fn build_exec(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let (name, reverse) = exec_operation_name(op);
    let mut cmd = Command::mi(name);
    if reverse {
        cmd = cmd.arg("--reverse");
    }
    if all_threads(op) {
        cmd = cmd.arg("--all");
    }
    Ok(cmd)
}

fn build_break_insert(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let Operation::BreakInsert(bp) = op else {
        unreachable!()
    };
    if bp.location.trim().is_empty() {
        return Err(FactoryError::InvalidArgument(
            op.kind(),
            "empty breakpoint location",
        ));
    }

    let mut cmd = Command::mi("break-insert");
    if bp.temporary {
        cmd = cmd.arg("-t");
    }
    if bp.hardware {
        cmd = cmd.arg("-h");
    }
    if let Some(cond) = &bp.condition {
        cmd = cmd.args(["-c", cond.as_str()]);
    }
    if let Some(count) = bp.ignore_count {
        cmd = cmd.args(["-i".to_string(), count.to_string()]);
    }
    Ok(cmd.arg(bp.location.as_str()))
}

fn build_break_numbers(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let (name, numbers) = match op {
        Operation::BreakDelete(n) => ("break-delete", n),
        Operation::BreakEnable(n) => ("break-enable", n),
        Operation::BreakDisable(n) => ("break-disable", n),
        _ => unreachable!(),
    };
    if numbers.is_empty() {
        return Err(FactoryError::InvalidArgument(
            op.kind(),
            "empty breakpoint list",
        ));
    }
    Ok(Command::mi(name).args(numbers.iter().map(ToString::to_string)))
}

fn build_break_condition(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let Operation::BreakCondition { number, condition } = op else {
        unreachable!()
    };
    Ok(Command::mi("break-condition")
        .arg(number.to_string())
        .arg(condition.as_str()))
}

fn build_break_watch(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let Operation::BreakWatch { expression, kind } = op else {
        unreachable!()
    };
    let mut cmd = Command::mi("break-watch");
    match kind {
        WatchKind::Write => {}
        WatchKind::Read => cmd = cmd.arg("-r"),
        WatchKind::Access => cmd = cmd.arg("-a"),
    }
    Ok(cmd.arg(expression.as_str()))
}

fn build_stack(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let cmd = match op {
        Operation::StackListFrames { range } => {
            let cmd = Command::mi("stack-list-frames");
            match range {
                None => cmd,
                Some((low, high)) if low > high => {
                    return Err(FactoryError::InvalidArgument(
                        op.kind(),
                        "low frame is above high frame",
                    ))
                }
                Some((low, high)) => cmd.args([low.to_string(), high.to_string()]),
            }
        }
        Operation::StackInfoDepth { max_depth } => {
            Command::mi("stack-info-depth").args(max_depth.map(|d| d.to_string()))
        }
        Operation::StackListLocals(print) => Command::mi("stack-list-locals").arg(match print {
            PrintValues::NoValues => "0",
            PrintValues::AllValues => "1",
            PrintValues::SimpleValues => "2",
        }),
        Operation::StackSelectFrame(level) => {
            Command::mi("stack-select-frame").arg(level.to_string())
        }
        _ => unreachable!(),
    };
    Ok(cmd)
}

/// Backends before 7.0 can't report thread details, only ids.
fn build_thread_list_ids(_: &Operation, _: Version) -> Result<Command, FactoryError> {
    Ok(Command::mi("thread-list-ids"))
}

fn build_thread_info(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let Operation::ThreadInfo(thread) = op else {
        unreachable!()
    };
    Ok(Command::mi("thread-info").args(thread.map(|t| t.to_string())))
}

fn build_thread_select(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let Operation::ThreadSelect(thread) = op else {
        unreachable!()
    };
    Ok(Command::mi("thread-select").arg(thread.to_string()))
}

fn build_evaluate(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let Operation::DataEvaluateExpression(expr) = op else {
        unreachable!()
    };
    if expr.trim().is_empty() {
        return Err(FactoryError::InvalidArgument(op.kind(), "empty expression"));
    }
    Ok(Command::mi("data-evaluate-expression").arg(expr.as_str()))
}

fn memory_args(op: &Operation) -> Result<(&str, usize), FactoryError> {
    let Operation::DataReadMemory { address, count } = op else {
        unreachable!()
    };
    if *count == 0 {
        return Err(FactoryError::InvalidArgument(op.kind(), "zero bytes to read"));
    }
    Ok((address, *count))
}

fn build_read_memory_legacy(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let (address, count) = memory_args(op)?;
    // format x, word size 1, 1 row of `count` columns
    Ok(Command::mi("data-read-memory").args([
        address.to_string(),
        "x".to_string(),
        "1".to_string(),
        "1".to_string(),
        count.to_string(),
    ]))
}

fn build_read_memory(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let (address, count) = memory_args(op)?;
    Ok(Command::mi("data-read-memory-bytes").args([address.to_string(), count.to_string()]))
}

fn build_gdb_set(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let Operation::GdbSet { name, value } = op else {
        unreachable!()
    };
    if name.is_empty() {
        return Err(FactoryError::InvalidArgument(op.kind(), "empty variable name"));
    }
    Ok(Command::mi("gdb-set").args([name.as_str(), value.as_str()]))
}

fn build_path_like(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let cmd = match op {
        Operation::TargetSelectRemote(target) => {
            Command::mi("target-select").args(["remote", target.as_str()])
        }
        Operation::FileExecAndSymbols(path) => {
            Command::mi("file-exec-and-symbols").arg(path.as_str())
        }
        _ => unreachable!(),
    };
    Ok(cmd)
}

fn build_console(op: &Operation, _: Version) -> Result<Command, FactoryError> {
    let Operation::Console(text) = op else {
        unreachable!()
    };
    if text.trim().is_empty() {
        return Err(FactoryError::InvalidArgument(op.kind(), "empty console command"));
    }
    Ok(Command::cli(text.as_str()))
}

/// Command factory shared by the session and its callers. Cheap to clone.
///
/// Backend descriptor is written once, on the session thread, when the
/// version probe completes.
#[derive(Clone, Default)]
pub struct CommandFactory {
    backend: Arc<OnceLock<BackendInfo>>,
}

impl CommandFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BackendState {
        match self.backend.get() {
            None => BackendState::NotNegotiated,
            Some(info) => BackendState::Negotiated(info.clone()),
        }
    }

    pub fn backend(&self) -> Option<&BackendInfo> {
        self.backend.get()
    }

    /// Record negotiated backend. Return false if the backend is already known.
    pub(crate) fn set_backend(&self, info: BackendInfo) -> bool {
        self.backend.set(info).is_ok()
    }

    /// Build a command for `operation` scoped to an optional debug context.
    pub fn create(
        &self,
        operation: &Operation,
        context: Option<ContextId>,
    ) -> Result<Command, FactoryError> {
        let kind = operation.kind();
        let version = match self.backend.get() {
            Some(info) => info.version,
            None if kind.is_probe() => Version::default(),
            None => return Err(FactoryError::NotNegotiated(kind)),
        };
        Self::create_for(operation, context, version)
    }

    /// Build a command for a known backend version.
    pub(crate) fn create_for(
        operation: &Operation,
        context: Option<ContextId>,
        version: Version,
    ) -> Result<Command, FactoryError> {
        let kind = operation.kind();
        let capability = CAPABILITIES
            .iter()
            .filter(|c| c.kind == kind && c.since <= version)
            .max_by_key(|c| c.since)
            .ok_or(FactoryError::Unsupported {
                operation: kind,
                version,
            })?;

        let mut cmd = (capability.build)(operation, version)?;
        if let Some(ctx) = context {
            cmd = cmd.context(ctx);
        }
        if kind.is_query() {
            let key = cmd.to_string();
            cmd = cmd.coalesce(key);
        }
        Ok(cmd)
    }

    /// Operation kinds available for a backend version.
    pub fn supported_operations(version: Version) -> Vec<OperationKind> {
        CAPABILITIES
            .iter()
            .filter(|c| c.since <= version)
            .map(|c| c.kind)
            .unique()
            .collect()
    }
}
