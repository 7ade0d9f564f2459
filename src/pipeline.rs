//! The phase driver.
//!
//! Runs the eleven phases in order over one user module layered over the
//! base module. Each phase runs to completion before the next begins; the
//! first error halts the pipeline and later phases are skipped. The only
//! cross-phase mutable state is the symbol metadata and interning tables
//! carried in [`Compilation`].

use tracing::{debug, debug_span};

use crate::base::{CompileOptions, Interner, Phase};
use crate::core::check::check as core_check;
use crate::core::defunctionalize::defunctionalize;
use crate::core::lambda_lift::lambda_lift;
use crate::core::simplify::pre_simplify;
use crate::core::state::state_analysis;
use crate::core::translate::translate;
use crate::core::{CoreArena, CoreSymbolTable};
use crate::error::Result;
use crate::syntax::ast::AstArena;
use crate::syntax::dependency::dependency_analyze;
use crate::syntax::parse_ast::ParseAstArena;
use crate::syntax::reify::reify;
use crate::syntax::rename::{build_scopes, rename};
use crate::syntax::scope::ScopeTable;
use crate::syntax::symbol::SymbolTable;
use crate::types::alias::alias_analysis;
use crate::types::base_module::BaseModule;
use crate::types::class::ClassTable;
use crate::types::infer::infer;
use crate::types::monomorphize::monomorphize;
use crate::types::TypeArena;

/// All cross-phase state of one compilation.
#[derive(Debug)]
pub struct Compilation {
    pub interner: Interner,
    pub symbols: SymbolTable,
    pub scopes: ScopeTable,
    pub types: TypeArena,
    pub classes: ClassTable,
    pub base: BaseModule,
    pub ast: AstArena,
    pub core: CoreArena,
    pub core_symbols: CoreSymbolTable,
}

impl Compilation {
    /// Compile the base module only, ready to reify a user module into.
    pub fn with_base() -> Compilation {
        let mut interner = Interner::new();
        let mut symbols = SymbolTable::new();
        let mut scopes = ScopeTable::new();
        let mut types = TypeArena::new();
        let mut classes = ClassTable::new();
        let mut ast = AstArena::new();
        let base = BaseModule::compile(
            &mut interner,
            &mut symbols,
            &mut scopes,
            &mut types,
            &mut classes,
            &mut ast,
        );
        Compilation {
            interner,
            symbols,
            scopes,
            types,
            classes,
            base,
            ast,
            core: CoreArena::new(),
            core_symbols: CoreSymbolTable::new(),
        }
    }
}

/// Run the front and middle end over a parse tree.
pub fn compile(parse: &ParseAstArena, options: &CompileOptions) -> Result<Compilation> {
    let mut c = Compilation::with_base();
    compile_into(parse, options, &mut c)?;
    Ok(c)
}

/// As [`compile`], reusing an existing base-module compilation.
pub fn compile_into(
    parse: &ParseAstArena,
    options: &CompileOptions,
    c: &mut Compilation,
) -> Result<()> {
    // A: reify
    {
        let _span = debug_span!("phase", name = Phase::Reify.name()).entered();
        let ast = std::mem::take(&mut c.ast);
        c.ast = reify(parse, &mut c.interner, &mut c.symbols, ast);
        debug!(nodes = c.ast.nodes.len(), "reified");
    }
    if options.should_stop_after(Phase::Reify) {
        return Ok(());
    }

    // B: scope build
    {
        let _span = debug_span!("phase", name = Phase::ScopeBuild.name()).entered();
        build_scopes(&mut c.ast, &mut c.symbols, &mut c.scopes)?;
        debug!(scopes = c.scopes.len(), "scopes built");
    }
    if options.should_stop_after(Phase::ScopeBuild) {
        return Ok(());
    }

    // C: rename
    {
        let _span = debug_span!("phase", name = Phase::Rename.name()).entered();
        rename(&mut c.ast, &mut c.symbols, &c.scopes)?;
    }
    if options.should_stop_after(Phase::Rename) {
        return Ok(());
    }

    // D: dependency analysis
    {
        let _span = debug_span!("phase", name = Phase::DependencyAnalysis.name()).entered();
        dependency_analyze(&mut c.ast, &mut c.symbols, &c.scopes, &mut c.interner);
    }
    if options.should_stop_after(Phase::DependencyAnalysis) {
        return Ok(());
    }

    // E: kind and type inference, with the ownership checker's alias
    // analysis embedded at the end of the phase.
    {
        let _span = debug_span!("phase", name = Phase::Infer.name()).entered();
        infer(
            &mut c.ast,
            &mut c.symbols,
            &c.scopes,
            &mut c.types,
            &mut c.classes,
            &c.base,
            &mut c.interner,
        )?;
        alias_analysis(&c.ast, &mut c.symbols, &c.types, &c.base)?;
        debug!(types = c.types.len(), "inferred");
    }
    if options.should_stop_after(Phase::Infer) {
        return Ok(());
    }

    // F: monomorphization
    {
        let _span = debug_span!("phase", name = Phase::Monomorphize.name()).entered();
        monomorphize(
            &mut c.ast,
            &mut c.symbols,
            &c.scopes,
            &mut c.types,
            &c.classes,
            &c.base,
            &mut c.interner,
        )?;
    }
    if options.should_stop_after(Phase::Monomorphize) {
        return Ok(());
    }

    // G: core translation, followed by the type sanity check.
    {
        let _span = debug_span!("phase", name = Phase::CoreTranslate.name()).entered();
        translate(
            &c.ast,
            &c.symbols,
            &mut c.types,
            &c.classes,
            &c.base,
            &mut c.interner,
            &mut c.core,
            &mut c.core_symbols,
        )?;
        if options.verbosity > 0 {
            core_check(
                &c.core,
                &c.core_symbols,
                &mut c.types,
                &mut c.symbols,
                &c.scopes,
                &c.classes,
                &c.base,
                &mut c.interner,
            )?;
        }
        debug!(nodes = c.core.len(), "translated");
    }
    if options.should_stop_after(Phase::CoreTranslate) {
        return Ok(());
    }

    // H: pre-simplify
    {
        let _span = debug_span!("phase", name = Phase::CorePreSimplify.name()).entered();
        pre_simplify(
            &mut c.core,
            &mut c.core_symbols,
            &c.ast,
            &mut c.types,
            &mut c.symbols,
            &c.scopes,
            &c.classes,
            &c.base,
            &mut c.interner,
        )?;
    }
    if options.should_stop_after(Phase::CorePreSimplify) {
        return Ok(());
    }

    // I: lambda lift
    {
        let _span = debug_span!("phase", name = Phase::LambdaLift.name()).entered();
        lambda_lift(
            &mut c.core,
            &mut c.core_symbols,
            &mut c.types,
            &mut c.interner,
        );
    }
    if options.should_stop_after(Phase::LambdaLift) {
        return Ok(());
    }

    // J: defunctionalization, re-checked afterwards.
    {
        let _span = debug_span!("phase", name = Phase::Defunctionalize.name()).entered();
        defunctionalize(
            &mut c.core,
            &mut c.core_symbols,
            &mut c.types,
            &mut c.symbols,
            &c.scopes,
            &c.classes,
            &c.base,
            &mut c.interner,
        )?;
        if options.verbosity > 0 {
            core_check(
                &c.core,
                &c.core_symbols,
                &mut c.types,
                &mut c.symbols,
                &c.scopes,
                &c.classes,
                &c.base,
                &mut c.interner,
            )?;
        }
    }
    if options.should_stop_after(Phase::Defunctionalize) {
        return Ok(());
    }

    // K: state analysis and deep-copy synthesis
    {
        let _span = debug_span!("phase", name = Phase::StateAnalysis.name()).entered();
        state_analysis(
            &mut c.core,
            &mut c.core_symbols,
            &mut c.types,
            &mut c.symbols,
            &c.scopes,
            &c.classes,
            &c.base,
            &mut c.interner,
        );
        if options.verbosity > 1 {
            if let Some(root) = c.core.root {
                debug!(
                    "{}",
                    c.core.pretty_print(root, &c.core_symbols, &c.types)
                );
            }
        }
    }
    Ok(())
}
