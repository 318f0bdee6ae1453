//! Host builtins exposed to Gza scripts.
//!
//! Every builtin follows the same discipline: validate arguments (misuse
//! schedules a pending `InvalidScript` and returns nil), consult the
//! sandbox where a policy applies, and influence the editor only by
//! enqueuing actions on the call context. Pure utilities return values
//! directly.

use core_script::value::Value;
use core_script::vm::{HostContext, Vm};
use tracing::{debug, info};

use crate::context::{HostCallContext, PluginAction};
use crate::HostError;

/// Register the full builtin surface on a VM.
pub fn install(vm: &mut Vm) {
    vm.define_builtin("show_message", show_message);
    vm.define_builtin("register_command", register_command);
    vm.define_builtin("register_keymap", register_keymap);
    vm.define_builtin("register_event_handler", register_event_handler);
    vm.define_builtin("register_theme", register_theme);
    vm.define_builtin("len", len);
    vm.define_builtin("print", print);
    vm.define_builtin("type", type_name);
    vm.define_builtin("to_upper", to_upper);
    vm.define_builtin("to_lower", to_lower);
    vm.define_builtin("buffer_line_count", buffer_line_count);
    vm.define_builtin("buffer_get_line", buffer_get_line);
    vm.define_builtin("buffer_set_line", buffer_set_line);
    vm.define_builtin("cursor_line", cursor_line);
    vm.define_builtin("cursor_col", cursor_col);
    vm.define_builtin("set_cursor", set_cursor);
    vm.define_builtin("selection_start", selection_start);
    vm.define_builtin("selection_end", selection_end);
    vm.define_builtin("read_file", read_file);
    vm.define_builtin("http_get", http_get);
}

fn host<'a>(ctx: &'a mut dyn HostContext) -> Option<&'a mut HostCallContext> {
    ctx.as_any_mut().downcast_mut::<HostCallContext>()
}

fn misuse(ctx: &mut dyn HostContext, message: &str) -> Value {
    if let Some(h) = host(ctx) {
        h.fail(HostError::InvalidScript(message.to_string()));
    }
    Value::Nil
}

fn string_arg(args: &[Value], index: usize) -> Option<String> {
    args.get(index)
        .and_then(Value::as_str)
        .map(|b| String::from_utf8_lossy(b).into_owned())
}

fn opt_string_arg(args: &[Value], index: usize) -> Result<Option<String>, ()> {
    match args.get(index) {
        None | Some(Value::Nil) => Ok(None),
        Some(v) => v
            .as_str()
            .map(|b| Some(String::from_utf8_lossy(b).into_owned()))
            .ok_or(()),
    }
}

fn num_arg(args: &[Value], index: usize) -> Option<f64> {
    args.get(index).and_then(Value::as_num)
}

fn index_arg(args: &[Value], index: usize) -> Option<usize> {
    num_arg(args, index).and_then(|n| {
        (n.fract() == 0.0 && n >= 0.0).then_some(n as usize)
    })
}

// ---------------------------------------------------------------- actions

fn show_message(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let Some(text) = string_arg(args, 0) else {
        return misuse(ctx, "show_message expects (string)");
    };
    if let Some(h) = host(ctx) {
        h.actions.push(PluginAction::ShowMessage(text));
    }
    Value::Nil
}

fn register_command(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let (Some(name), Some(handler)) = (string_arg(args, 0), string_arg(args, 1)) else {
        return misuse(ctx, "register_command expects (name, handler, description?)");
    };
    let Ok(description) = opt_string_arg(args, 2) else {
        return misuse(ctx, "register_command description must be a string");
    };
    if let Some(h) = host(ctx) {
        h.actions.push(PluginAction::RegisterCommand {
            name,
            handler,
            description,
        });
    }
    Value::Nil
}

fn register_keymap(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let (Some(keys), Some(handler)) = (string_arg(args, 0), string_arg(args, 1)) else {
        return misuse(ctx, "register_keymap expects (keys, handler, mode?, description?)");
    };
    let (Ok(mode), Ok(description)) = (opt_string_arg(args, 2), opt_string_arg(args, 3)) else {
        return misuse(ctx, "register_keymap mode/description must be strings");
    };
    if let Some(h) = host(ctx) {
        h.actions.push(PluginAction::RegisterKeymap {
            keys,
            handler,
            mode,
            description,
        });
    }
    Value::Nil
}

fn register_event_handler(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let (Some(event), Some(handler)) = (string_arg(args, 0), string_arg(args, 1)) else {
        return misuse(ctx, "register_event_handler expects (event, handler)");
    };
    if let Some(h) = host(ctx) {
        h.actions
            .push(PluginAction::RegisterEventHandler { event, handler });
    }
    Value::Nil
}

fn register_theme(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let (Some(name), Some(colors)) = (string_arg(args, 0), string_arg(args, 1)) else {
        return misuse(ctx, "register_theme expects (name, colors)");
    };
    if let Some(h) = host(ctx) {
        h.actions.push(PluginAction::RegisterTheme { name, colors });
    }
    Value::Nil
}

// ---------------------------------------------------------------- utilities

fn len(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    match args.first() {
        Some(Value::Str(s)) => Value::Num(s.len() as f64),
        Some(Value::Array(a)) => Value::Num(a.borrow().len() as f64),
        Some(Value::Table(t)) => Value::Num(t.borrow().len() as f64),
        _ => misuse(ctx, "len expects (string | array | table)"),
    }
}

fn print(_ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let rendered: Vec<String> = args
        .iter()
        .map(|v| String::from_utf8_lossy(&v.display_bytes()).into_owned())
        .collect();
    info!(target: "script.print", "{}", rendered.join(" "));
    Value::Nil
}

fn type_name(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    match args.first() {
        Some(v) => Value::str_from(v.type_name().as_bytes()),
        None => misuse(ctx, "type expects one argument"),
    }
}

fn to_upper(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    match args.first().and_then(Value::as_str) {
        Some(bytes) => Value::str_from_owned(bytes.to_ascii_uppercase()),
        None => misuse(ctx, "to_upper expects (string)"),
    }
}

fn to_lower(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    match args.first().and_then(Value::as_str) {
        Some(bytes) => Value::str_from_owned(bytes.to_ascii_lowercase()),
        None => misuse(ctx, "to_lower expects (string)"),
    }
}

// ---------------------------------------------------------------- editor API

fn buffer_line_count(ctx: &mut dyn HostContext, _args: &[Value]) -> Value {
    match host(ctx) {
        Some(h) => Value::Num(h.editor.lines.len() as f64),
        None => Value::Nil,
    }
}

fn buffer_get_line(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let Some(index) = index_arg(args, 0) else {
        return misuse(ctx, "buffer_get_line expects (line_index)");
    };
    match host(ctx) {
        Some(h) => h
            .editor
            .lines
            .get(index)
            .map(|l| Value::str_from(l.as_bytes()))
            .unwrap_or(Value::Nil),
        None => Value::Nil,
    }
}

fn buffer_set_line(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let (Some(index), Some(text)) = (index_arg(args, 0), string_arg(args, 1)) else {
        return misuse(ctx, "buffer_set_line expects (line_index, text)");
    };
    if let Some(h) = host(ctx) {
        if index >= h.editor.lines.len() {
            h.fail(HostError::BadPosition(index));
            return Value::Nil;
        }
        // Keep the snapshot coherent for scripts that read back what they
        // just wrote; the real edit applies after the run succeeds.
        h.editor.lines[index] = text.clone();
        h.actions.push(PluginAction::SetLine { index, text });
    }
    Value::Nil
}

fn cursor_line(ctx: &mut dyn HostContext, _args: &[Value]) -> Value {
    match host(ctx) {
        Some(h) => Value::Num(h.editor.cursor_line as f64),
        None => Value::Nil,
    }
}

fn cursor_col(ctx: &mut dyn HostContext, _args: &[Value]) -> Value {
    match host(ctx) {
        Some(h) => Value::Num(h.editor.cursor_col as f64),
        None => Value::Nil,
    }
}

fn set_cursor(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let (Some(line), Some(col)) = (index_arg(args, 0), index_arg(args, 1)) else {
        return misuse(ctx, "set_cursor expects (line, col)");
    };
    if let Some(h) = host(ctx) {
        if line >= h.editor.lines.len().max(1) {
            h.fail(HostError::BadPosition(line));
            return Value::Nil;
        }
        h.editor.cursor_line = line;
        h.editor.cursor_col = col;
        h.actions.push(PluginAction::SetCursor { line, col });
    }
    Value::Nil
}

fn selection_start(ctx: &mut dyn HostContext, _args: &[Value]) -> Value {
    match host(ctx).and_then(|h| h.editor.selection) {
        Some((start, _)) => Value::Num(start as f64),
        None => Value::Nil,
    }
}

fn selection_end(ctx: &mut dyn HostContext, _args: &[Value]) -> Value {
    match host(ctx).and_then(|h| h.editor.selection) {
        Some((_, end)) => Value::Num(end as f64),
        None => Value::Nil,
    }
}

// ---------------------------------------------------------------- sandboxed I/O

fn read_file(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let Some(path) = string_arg(args, 0) else {
        return misuse(ctx, "read_file expects (path)");
    };
    let Some(h) = host(ctx) else {
        return Value::Nil;
    };
    if !h.authorize_file_access(&path) {
        return Value::Nil;
    }
    match std::fs::read(&path) {
        Ok(bytes) => Value::str_from_owned(bytes),
        Err(err) => {
            debug!(target: "host.io", path = %path, error = %err, "read_file_failed");
            Value::Nil
        }
    }
}

/// Network egress point. Policy is enforced here; the transport itself is
/// an external collaborator, so an authorized request currently resolves to
/// nil rather than performing I/O.
fn http_get(ctx: &mut dyn HostContext, args: &[Value]) -> Value {
    let Some(url) = string_arg(args, 0) else {
        return misuse(ctx, "http_get expects (url)");
    };
    let Some(h) = host(ctx) else {
        return Value::Nil;
    };
    if !h.authorize_network_access() {
        return Value::Nil;
    }
    debug!(target: "host.io", url = %url, "http_get_authorized");
    Value::Nil
}
