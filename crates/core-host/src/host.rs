//! The script host proper: compilation entry points and guarded execution.

use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

use core_script::value::{Function, Value};
use core_script::vm::Vm;
use core_script::{ScriptError, TrackedAlloc, compile};
use tracing::{debug, info};

use crate::context::{
    ActionSink, EditorQuery, EditorSnapshot, HostCallContext, PluginAction,
};
use crate::{CONFIG_SIZE_CAP, ExecStats, HostError, Result, SandboxConfig, builtins};

/// A compiled plugin script: owns its bytecode and the action buffer that
/// fills during execution and drains into the callback sink afterwards.
pub struct CompiledPlugin {
    script: Rc<Function>,
    actions: Vec<PluginAction>,
}

impl CompiledPlugin {
    /// Actions accumulated by the last successful run that have not been
    /// drained yet. Normally empty, since `execute_setup` drains eagerly.
    pub fn pending_actions(&self) -> &[PluginAction] {
        &self.actions
    }
}

/// One VM engine plus sandbox enforcement and execution statistics.
pub struct ScriptHost {
    vm: Vm,
    sandbox: SandboxConfig,
    stats: ExecStats,
    config_script: Option<Rc<Function>>,
    setup_invoked: bool,
}

impl ScriptHost {
    pub fn new(sandbox: SandboxConfig) -> Self {
        let mut vm = Vm::new(TrackedAlloc::new(sandbox.max_memory_bytes));
        builtins::install(&mut vm);
        Self {
            vm,
            sandbox,
            stats: ExecStats::default(),
            config_script: None,
            setup_invoked: false,
        }
    }

    pub fn sandbox(&self) -> &SandboxConfig {
        &self.sandbox
    }

    pub fn stats(&self) -> ExecStats {
        self.stats
    }

    pub fn setup_invoked(&self) -> bool {
        self.setup_invoked
    }

    /// Read and compile `init.gza` from a configuration directory. I/O
    /// failures surface as `ConfigNotLoaded`; syntax failures as
    /// `InvalidScript`. No partial state survives a failure.
    pub fn load_config(&mut self, dir: &Path) -> Result<()> {
        self.config_script = None;
        let path = dir.join("init.gza");
        let meta = std::fs::metadata(&path)
            .map_err(|e| HostError::ConfigNotLoaded(format!("{}: {e}", path.display())))?;
        if meta.len() > CONFIG_SIZE_CAP {
            return Err(HostError::ConfigNotLoaded(format!(
                "{} exceeds the {CONFIG_SIZE_CAP} byte cap",
                path.display()
            )));
        }
        let source = std::fs::read_to_string(&path)
            .map_err(|e| HostError::ConfigNotLoaded(format!("{}: {e}", path.display())))?;
        let function = compile(&source).map_err(HostError::from_script)?;
        info!(target: "host.config", path = %path.display(), "config_compiled");
        self.config_script = Some(Rc::new(function));
        Ok(())
    }

    /// Execute the retained configuration script once.
    pub fn call_setup(
        &mut self,
        editor: &dyn EditorQuery,
        sink: &mut dyn ActionSink,
    ) -> Result<()> {
        let script = self
            .config_script
            .clone()
            .ok_or_else(|| HostError::ConfigNotLoaded("no configuration script".to_string()))?;
        let actions = self.run_guarded(editor, |vm, ctx, deadline| {
            vm.run_script(script, ctx, deadline)
        })?;
        drain(actions, sink);
        self.setup_invoked = true;
        Ok(())
    }

    pub fn compile_plugin_script(&mut self, source: &str) -> Result<CompiledPlugin> {
        let function = compile(source).map_err(HostError::from_script)?;
        Ok(CompiledPlugin {
            script: Rc::new(function),
            actions: Vec::new(),
        })
    }

    /// Run a plugin's top-level script under resource guards, then drain its
    /// accumulated actions into the callback slots. A failed run delivers
    /// nothing.
    pub fn execute_setup(
        &mut self,
        plugin: &mut CompiledPlugin,
        editor: &dyn EditorQuery,
        sink: &mut dyn ActionSink,
    ) -> Result<()> {
        let script = Rc::clone(&plugin.script);
        let actions = self.run_guarded(editor, |vm, ctx, deadline| {
            vm.run_script(script, ctx, deadline)
        })?;
        plugin.actions = actions;
        drain(std::mem::take(&mut plugin.actions), sink);
        Ok(())
    }

    /// Invoke a named script function, discarding its result.
    pub fn call_void(
        &mut self,
        name: &str,
        editor: &dyn EditorQuery,
        sink: &mut dyn ActionSink,
    ) -> Result<()> {
        let actions = self.run_guarded(editor, |vm, ctx, deadline| {
            vm.call_by_name(name, &[], ctx, deadline)
        })?;
        drain(actions, sink);
        Ok(())
    }

    /// Invoke a named script function and interpret the result as a boolean
    /// (standard truthiness).
    pub fn call_bool(
        &mut self,
        name: &str,
        editor: &dyn EditorQuery,
        sink: &mut dyn ActionSink,
    ) -> Result<bool> {
        let mut truthy = false;
        let actions = self.run_guarded(editor, |vm, ctx, deadline| {
            let value = vm.call_by_name(name, &[], ctx, deadline)?;
            truthy = value.is_truthy();
            Ok(Value::Nil)
        })?;
        drain(actions, sink);
        Ok(truthy)
    }

    /// Resource guard around one VM invocation: snapshot the editor, run
    /// against the wall-clock deadline, fold the context's counters into the
    /// host stats (success or failure), and hand back the action buffer on
    /// success only.
    fn run_guarded<F>(&mut self, editor: &dyn EditorQuery, run: F) -> Result<Vec<PluginAction>>
    where
        F: FnOnce(
            &mut Vm,
            &mut HostCallContext,
            Option<Instant>,
        ) -> core_script::Result<Value>,
    {
        let mut ctx = HostCallContext::new(
            self.sandbox.clone(),
            EditorSnapshot::capture(editor),
        );
        let budget = self.sandbox.execution_deadline();
        let started = Instant::now();
        let deadline = started + budget;
        let outcome = run(&mut self.vm, &mut ctx, Some(deadline));
        let elapsed = started.elapsed();

        self.stats.invocations += 1;
        self.stats.total_wall += elapsed;
        self.stats.peak_memory = self.stats.peak_memory.max(self.vm.alloc().peak());
        self.stats.violations += ctx.violations;
        debug!(
            target: "host.exec",
            elapsed_ms = elapsed.as_millis() as u64,
            violations = ctx.violations,
            ok = outcome.is_ok(),
            "vm_invocation"
        );

        match outcome {
            Ok(_) if elapsed > budget => Err(HostError::ExecutionTimeout),
            Ok(_) => Ok(std::mem::take(&mut ctx.actions)),
            Err(ScriptError::HostFault(detail)) => Err(ctx
                .pending
                .take()
                .unwrap_or(HostError::SandboxViolation(detail))),
            Err(err) => Err(HostError::from_script(err)),
        }
    }
}

fn drain(actions: Vec<PluginAction>, sink: &mut dyn ActionSink) {
    for action in actions {
        match &action {
            PluginAction::ShowMessage(text) => sink.show_message(text),
            PluginAction::RegisterCommand {
                name,
                handler,
                description,
            } => sink.register_command(name, handler, description.as_deref()),
            PluginAction::RegisterKeymap {
                keys,
                handler,
                mode,
                description,
            } => sink.register_keymap(keys, handler, mode.as_deref(), description.as_deref()),
            PluginAction::RegisterEventHandler { event, handler } => {
                sink.register_event_handler(event, handler)
            }
            PluginAction::RegisterTheme { name, colors } => {
                sink.register_theme(name, colors)
            }
            PluginAction::SetLine { .. } | PluginAction::SetCursor { .. } => {
                sink.apply_edit(&action)
            }
        }
    }
}
