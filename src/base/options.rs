//! Pipeline configuration.
//!
//! Mirrors the compile-info interface: verbosity and an optional stop phase
//! govern trace output and early exit. Nothing here reads the environment.

/// The totally-ordered pipeline phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Reify,
    ScopeBuild,
    Rename,
    DependencyAnalysis,
    Infer,
    Monomorphize,
    CoreTranslate,
    CorePreSimplify,
    LambdaLift,
    Defunctionalize,
    StateAnalysis,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Reify => "reify",
            Phase::ScopeBuild => "scope-build",
            Phase::Rename => "rename",
            Phase::DependencyAnalysis => "dependency-analysis",
            Phase::Infer => "infer",
            Phase::Monomorphize => "monomorphize",
            Phase::CoreTranslate => "core-translate",
            Phase::CorePreSimplify => "core-pre-simplify",
            Phase::LambdaLift => "lambda-lift",
            Phase::Defunctionalize => "defunctionalize",
            Phase::StateAnalysis => "state-analysis",
        }
    }
}

/// Optimization level. The middle end only distinguishes "off" from "on";
/// the inlining needed by defunctionalization always runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OptLevel {
    #[default]
    None,
    Default,
}

/// Options controlling a single compilation.
#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// 0 = silent, 1 = phase summaries, 2 = full tree dumps.
    pub verbosity: u8,
    /// Stop the pipeline after this phase completes.
    pub stop_after: Option<Phase>,
    pub opt_level: OptLevel,
}

impl CompileOptions {
    pub fn verbose(verbosity: u8) -> Self {
        CompileOptions {
            verbosity,
            ..Default::default()
        }
    }

    /// True when the pipeline should not run phases beyond `phase`.
    pub fn should_stop_after(&self, phase: Phase) -> bool {
        self.stop_after.map(|stop| phase >= stop).unwrap_or(false)
    }
}
