//! Virtual machine
//!
//! The VM is an explicitly constructed object owning every piece of shared interpreter state:
//! - the expression engine and command table used to compile and run scripts
//! - the global table
//! - the program registry and the cache of named scripts
//! - the background daemon and the global exception signal
//!
//! All execution is single-threaded: a synchronous run, or one scheduler tick, at a time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use super::commands::{Command, CommandTable};
use super::compiler::program::{Program, ProgramRegistry};
use super::compiler::{compile_file, compile_source};
use super::engine::{ExpressionEngine, StandardEngine};
use super::errors::{CommandError, EngineFault, VmError};
use super::executor::background::{self, BackgroundDaemon, TickReport};
use super::executor::{evaluate_node, run_until_done, ContextId, ExecutionContext};
use super::globals::GlobalTable;
use super::value::Value;
use crate::config::Config;

/// tracing target for script console output
pub const CONSOLE_TARGET: &str = "lute::console";

pub struct Vm {
    config: Config,
    engine: Rc<dyn ExpressionEngine>,
    commands: CommandTable,
    globals: GlobalTable,
    registry: ProgramRegistry,

    /// Named scripts, keyed by resolved path.
    cache: HashMap<PathBuf, Rc<Program>>,
    background: BackgroundDaemon,

    global_exception: bool,
    call_depth: usize,
    next_context_id: u64,
    console: Vec<String>,
}

impl Vm {
    pub fn new(config: Config) -> Self {
        Self::with_engine(config, Rc::new(StandardEngine::new()))
    }

    pub fn with_engine(config: Config, engine: Rc<dyn ExpressionEngine>) -> Self {
        tracing::debug!(engine = engine.name(), "Creating VM");
        Self {
            config,
            engine,
            commands: CommandTable::standard(),
            globals: GlobalTable::new(),
            registry: ProgramRegistry::new(),
            cache: HashMap::new(),
            background: BackgroundDaemon::new(),
            global_exception: false,
            call_depth: 0,
            next_context_id: 0,
            console: Vec::new(),
        }
    }

    pub fn with_globals(mut self, globals: GlobalTable) -> Self {
        self.globals = globals;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Rc<dyn ExpressionEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    /* ===================== Globals ===================== */

    pub fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut GlobalTable {
        &mut self.globals
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Sets (or declares) a global. Returns the previous value.
    pub fn set_global(&mut self, name: &str, value: Value) -> Option<Value> {
        self.globals.set(name, value)
    }

    /// Removes a global and invalidates every program referencing it.
    pub fn remove_global(&mut self, name: &str) -> Option<Value> {
        let old = self.globals.remove(name)?;
        self.invalidate_dependents(name);
        Some(old)
    }

    /* ===================== Commands ===================== */

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn register_command(&mut self, command: Rc<dyn Command>) -> Result<(), CommandError> {
        self.commands.register(command)
    }

    /// Unregisters a command and invalidates every program calling it.
    pub fn unregister_command(&mut self, name: &str) -> Result<Rc<dyn Command>, CommandError> {
        let command = self.commands.unregister(name)?;
        let info = command.info();
        self.invalidate_dependents(info.name);
        if let Some(alias) = info.alias {
            self.invalidate_dependents(alias);
        }
        Ok(command)
    }

    /* ===================== Compilation ===================== */

    /// Compile script text. The program is returned whatever its final state.
    pub fn compile(&self, source: &str) -> Result<Rc<Program>, VmError> {
        Ok(Rc::new(compile_source(self, source, None)?))
    }

    pub fn compile_file(&self, path: &Path) -> Result<Rc<Program>, VmError> {
        Ok(Rc::new(compile_file(self, path)?))
    }

    /// Path of the script called `name` (`/`-separated, extension optional).
    pub fn resolve_script(&self, name: &str) -> PathBuf {
        let mut path = self.config.script_root.join(name);
        if path.extension().is_none() {
            path.set_extension(&self.config.script_extension);
        }
        path
    }

    /// Compiled program for the script called `name`, from the cache when still valid.
    pub fn load_script(&mut self, name: &str) -> Result<Rc<Program>, VmError> {
        let path = self.resolve_script(name);
        if let Some(program) = self.cache.get(&path) {
            if program.is_valid() {
                return Ok(Rc::clone(program));
            }
            tracing::debug!(script = program.name(), "Recompiling invalidated script");
        }

        let source = std::fs::read_to_string(&path).map_err(|source| VmError::Io {
            path: path.clone(),
            source,
        })?;
        let program = compile_source(self, &source, Some(path.clone()))?;
        if !program.is_valid() {
            return Err(VmError::Compile {
                name: program.name().to_string(),
                diagnostics: program.diagnostics().to_vec(),
            });
        }

        let program = Rc::new(program);
        self.cache.insert(path, Rc::clone(&program));
        Ok(program)
    }

    pub fn cached_programs(&self) -> impl Iterator<Item = &Rc<Program>> {
        self.cache.values()
    }

    /// Drops the VM's hold on `program`. Refused while any context is running it.
    pub fn release_program(&mut self, program: Rc<Program>) -> Result<(), VmError> {
        if self.registry.is_executing(program.id()) {
            return Err(VmError::ProgramExecuting(program.name().to_string()));
        }
        self.cache.retain(|_, cached| !Rc::ptr_eq(cached, &program));
        Ok(())
    }

    /// Marks every known program referencing `symbol` as needing recompilation.
    pub fn invalidate_dependents(&self, symbol: &str) {
        let engine = Rc::clone(&self.engine);
        let programs = self
            .cache
            .values()
            .chain(self.background.iter().map(|ctx| ctx.program()));

        for program in programs {
            let Some(metadata) = program.metadata() else {
                continue;
            };
            if program.is_valid() && engine.depends_on(metadata, symbol) {
                tracing::debug!(script = program.name(), symbol, "Invalidating bytecode");
                program.invalidate_bytecode();
            }
        }
    }

    /* ===================== Execution ===================== */

    /// Creates a context: binds parameters, then evaluates initializers in declaration order.
    pub fn create_context(
        &mut self,
        program: &Rc<Program>,
        arguments: Vec<Value>,
    ) -> Result<ExecutionContext, VmError> {
        self.next_context_id += 1;
        let mut ctx =
            ExecutionContext::new(ContextId(self.next_context_id), Rc::clone(program), arguments)?;

        self.enter_call();
        let result = self.evaluate_initializers(program, &mut ctx);
        self.leave_call();
        result.map(|()| ctx)
    }

    fn evaluate_initializers(
        &mut self,
        program: &Rc<Program>,
        ctx: &mut ExecutionContext,
    ) -> Result<(), VmError> {
        let tree = program
            .tree()
            .ok_or_else(|| EngineFault::new("valid program has no syntax tree"))?;
        for &id in &tree.initializers {
            evaluate_node(self, ctx, tree.node(id))?;
            if self.global_exception {
                return Err(VmError::GlobalException(program.name().to_string()));
            }
        }
        Ok(())
    }

    /// Runs `program` synchronously to completion in a fresh context.
    pub fn run_program(
        &mut self,
        program: &Rc<Program>,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, VmError> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(VmError::CallDepthExceeded(self.config.max_call_depth));
        }

        self.enter_call();
        let result = self.run_to_completion(program, arguments);
        self.leave_call();

        if let Err(e) = &result {
            tracing::error!(script = program.name(), "Script failed: {}", e);
        }
        result
    }

    fn run_to_completion(
        &mut self,
        program: &Rc<Program>,
        arguments: Vec<Value>,
    ) -> Result<Option<Value>, VmError> {
        let mut ctx = self.create_context(program, arguments)?;
        ctx.begin_run()?;
        run_until_done(self, &mut ctx)?;
        Ok(ctx.take_return_value())
    }

    /* ===================== Background ===================== */

    /// Hands a new context for `program` to the background daemon.
    pub fn background(
        &mut self,
        program: &Rc<Program>,
        arguments: Vec<Value>,
    ) -> Result<ContextId, VmError> {
        let mut ctx = self.create_context(program, arguments)?;
        ctx.set_backgrounded(true);
        let id = ctx.id();
        tracing::info!(script = program.name(), context = id.0, "Script backgrounded");
        self.background.add(ctx);
        Ok(id)
    }

    /// Advances every backgrounded context by `elapsed`.
    pub fn tick(&mut self, elapsed: Duration) -> TickReport {
        let mut contexts = self.background.take();
        let report = background::run_tick(self, &mut contexts, elapsed.as_secs_f64());
        self.background.restore(contexts);
        report
    }

    /// Retires a backgrounded context. Returns false when `id` isn't running.
    pub fn stop_background(&mut self, id: ContextId) -> bool {
        match self.background.remove(id) {
            Some(ctx) => {
                tracing::info!(script = ctx.program().name(), context = id.0, "Script stopped");
                true
            }
            None => false,
        }
    }

    pub fn background_contexts(&self) -> &BackgroundDaemon {
        &self.background
    }

    pub fn background_count(&self) -> usize {
        self.background.len()
    }

    /* ===================== Signals ===================== */

    /// Aborts every context in the current call chain at its next step.
    pub fn raise_global_exception(&mut self) {
        self.global_exception = true;
    }

    pub fn global_exception_raised(&self) -> bool {
        self.global_exception
    }

    pub fn call_depth(&self) -> usize {
        self.call_depth
    }

    pub(crate) fn enter_call(&mut self) {
        self.call_depth += 1;
    }

    /// Leaving the outermost call clears the global exception.
    pub(crate) fn leave_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
        if self.call_depth == 0 {
            self.global_exception = false;
        }
    }

    /* ===================== Console ===================== */

    pub fn log_console(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: CONSOLE_TARGET, "{}", message);
        self.console.push(message);
    }

    pub fn console(&self) -> &[String] {
        &self.console
    }

    pub fn take_console(&mut self) -> Vec<String> {
        std::mem::take(&mut self.console)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
