// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The embedded Lua runtime that evaluates route modules.
//!
//! A single sandboxed Lua state is shared by every module a loader evaluates.
//! Modules never see each other's locals: each one runs in its own environment
//! table that falls back to the shared globals and carries a private `require`
//! bound to that module's resolution table.

use mlua::{Function, HookTriggers, Lua, LuaSerdeExt, Table, Value, VmState};
use serde_json::Value as JsonValue;
use std::cell::Cell;
use std::fmt;
use std::path::Path;
use std::time::Instant;

use crate::error::{FolioError, Result};
use crate::render::escape_html;

/// VM instructions between two deadline checks.
const DEADLINE_CHECK_INTERVAL: u32 = 1000;

thread_local! {
    static DEADLINE: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Runs `f` with a Lua deadline on the current thread.
///
/// Lua code executed by this thread inside `f` fails with a runtime error
/// once `deadline` has passed, which releases the shared state. Other
/// threads are unaffected.
pub fn with_deadline<R>(deadline: Instant, f: impl FnOnce() -> R) -> R {
    struct Reset(Option<Instant>);
    impl Drop for Reset {
        fn drop(&mut self) {
            DEADLINE.with(|d| d.set(self.0));
        }
    }

    let _reset = Reset(DEADLINE.with(|d| d.replace(Some(deadline))));
    f()
}

fn deadline_passed() -> bool {
    DEADLINE.with(|d| d.get()).is_some_and(|deadline| Instant::now() >= deadline)
}

/// Sandboxed Lua state with the folio globals installed.
pub struct LuaRuntime {
    lua: Lua,
}

impl fmt::Debug for LuaRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaRuntime")
            .field("used_memory", &self.lua.used_memory())
            .finish()
    }
}

impl LuaRuntime {
    /// Creates the runtime: sandbox first, then `json`, `html` and `Response`.
    pub fn new() -> Result<Self> {
        let lua = Lua::new();
        let globals = lua.globals();

        sandbox_lua(&lua, &globals)?;
        globals.set("json", create_json_module(&lua)?)?;
        globals.set("html", create_html_module(&lua)?)?;
        globals.set("Response", create_response_module(&lua)?)?;

        lua.set_hook(
            HookTriggers::new().every_nth_instruction(DEADLINE_CHECK_INTERVAL),
            |_, _| {
                if deadline_passed() {
                    Err(mlua::Error::runtime("render deadline exceeded"))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );

        Ok(Self { lua })
    }

    /// The underlying Lua state.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Creates an empty table.
    pub fn create_table(&self) -> Result<Table> {
        Ok(self.lua.create_table()?)
    }

    /// Builds a module environment whose `require` only sees `resolutions`.
    pub fn module_env(&self, resolutions: Table) -> Result<Table> {
        let env = self.lua.create_table()?;
        let mt = self.lua.create_table()?;
        mt.set("__index", self.lua.globals())?;
        env.set_metatable(Some(mt));

        let require = self.lua.create_function(move |_, specifier: String| {
            match resolutions.raw_get::<Value>(specifier.as_str())? {
                Value::Nil => Err(mlua::Error::runtime(format!(
                    "module '{}' not found (only string-literal requires are resolved)",
                    specifier
                ))),
                value => Ok(value),
            }
        })?;
        env.raw_set("require", require)?;

        Ok(env)
    }

    /// Evaluates a compiled unit and returns its export table.
    ///
    /// A unit returning a bare function exports it as `default`. A unit
    /// returning nothing exports an empty table.
    pub fn evaluate(&self, code: &str, path: &Path, env: Table) -> Result<Table> {
        let value: Value = self
            .lua
            .load(code)
            .set_name(format!("@{}", path.display()))
            .set_environment(env)
            .eval()
            .map_err(|e| runtime_error(path, e))?;

        match value {
            Value::Table(exports) => Ok(exports),
            Value::Function(default) => {
                let exports = self.lua.create_table()?;
                exports.set("default", default)?;
                Ok(exports)
            }
            Value::Nil => Ok(self.lua.create_table()?),
            other => Err(FolioError::Runtime {
                file: path.to_path_buf(),
                message: format!(
                    "module must return a table or a function, got {}",
                    other.type_name()
                ),
            }),
        }
    }

    /// Converts a JSON document into a Lua value.
    pub fn json_value(&self, value: &serde_json::Value) -> Result<Value> {
        Ok(self.lua.to_value(value)?)
    }

    /// The `{ default = "" }` stand-in for stylesheet and image imports.
    pub fn asset_module(&self) -> Result<Table> {
        let module = self.lua.create_table()?;
        module.set("default", "")?;
        Ok(module)
    }

    /// A runtime-provided module by name.
    pub fn builtin(&self, name: &str) -> Result<Value> {
        Ok(self.lua.globals().raw_get(name)?)
    }
}

/// Maps a Lua failure inside `file` to [`FolioError::Runtime`].
///
/// The message keeps the Lua traceback on the lines after the first.
pub(crate) fn runtime_error(file: &Path, err: mlua::Error) -> FolioError {
    let message = match &err {
        mlua::Error::RuntimeError(message) => message.clone(),
        mlua::Error::CallbackError { traceback, cause } => format!("{}\n{}", cause, traceback),
        other => other.to_string(),
    };
    FolioError::Runtime {
        file: file.to_path_buf(),
        message,
    }
}

/// Calls a module function, mapping failures to [`FolioError::Runtime`].
pub(crate) fn call<R: mlua::FromLuaMulti>(
    file: &Path,
    function: &Function,
    args: impl mlua::IntoLuaMulti,
) -> Result<R> {
    function.call(args).map_err(|e| runtime_error(file, e))
}

/// Converts a Lua value to JSON.
///
/// Tables with only positive integer keys become arrays; every other table,
/// including an empty one, becomes an object. Functions and userdata
/// (including `json.null`) become `null`.
pub fn lua_to_json(value: &Value) -> mlua::Result<JsonValue> {
    Ok(match value {
        Value::Nil => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Integer(i) => JsonValue::Number((*i).into()),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.to_str()?.to_string()),
        Value::Table(t) => {
            let mut is_array = true;
            let mut max_index = 0i64;

            for pair in t.clone().pairs::<Value, Value>() {
                let (key, _) = pair?;
                match key {
                    Value::Integer(i) if i > 0 => max_index = max_index.max(i),
                    _ => {
                        is_array = false;
                        break;
                    }
                }
            }

            if is_array && max_index > 0 {
                let mut arr = Vec::with_capacity(max_index as usize);
                for i in 1..=max_index {
                    arr.push(lua_to_json(&t.raw_get::<Value>(i)?)?);
                }
                JsonValue::Array(arr)
            } else {
                let mut map = serde_json::Map::new();
                for pair in t.clone().pairs::<Value, Value>() {
                    let (key, val) = pair?;
                    let key = match key {
                        Value::String(s) => s.to_str()?.to_string(),
                        Value::Integer(i) => i.to_string(),
                        _ => continue,
                    };
                    map.insert(key, lua_to_json(&val)?);
                }
                JsonValue::Object(map)
            }
        }
        _ => JsonValue::Null,
    })
}

/// Removes filesystem, process and code-loading access from the globals.
fn sandbox_lua(lua: &Lua, globals: &Table) -> Result<()> {
    let os_table: Table = globals.get("os")?;
    let safe_os = lua.create_table()?;
    for name in ["date", "time", "clock", "difftime"] {
        safe_os.set(name, os_table.get::<Function>(name)?)?;
    }

    for name in ["io", "debug", "load", "loadstring", "loadfile", "dofile", "require"] {
        globals.set(name, Value::Nil)?;
    }
    globals.set("os", safe_os)?;

    Ok(())
}

/// `json.encode`, `json.encode_pretty`, `json.decode` and `json.null`.
fn create_json_module(lua: &Lua) -> Result<Table> {
    let json = lua.create_table()?;

    json.set(
        "encode",
        lua.create_function(|_, value: Value| {
            serde_json::to_string(&value)
                .map_err(|err| mlua::Error::external(format!("JSON encode error: {}", err)))
        })?,
    )?;
    json.set(
        "encode_pretty",
        lua.create_function(|_, value: Value| {
            serde_json::to_string_pretty(&value)
                .map_err(|err| mlua::Error::external(format!("JSON encode error: {}", err)))
        })?,
    )?;
    json.set(
        "decode",
        lua.create_function(|lua, text: String| {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => lua.to_value(&value),
                Err(err) => Err(mlua::Error::external(format!("JSON decode error: {}", err))),
            }
        })?,
    )?;
    json.set("null", lua.null())?;

    Ok(json)
}

fn create_html_module(lua: &Lua) -> Result<Table> {
    let html = lua.create_table()?;
    html.set(
        "escape",
        lua.create_function(|_, value: Value| {
            let text = match value {
                Value::Nil => String::new(),
                Value::String(s) => s.to_str()?.to_string(),
                other => other.to_string()?,
            };
            Ok(escape_html(&text))
        })?,
    )?;
    Ok(html)
}

/// `Response.json`, `Response.text` and `Response.redirect`.
///
/// Each builds a plain table in one of the shapes API handlers may return.
fn create_response_module(lua: &Lua) -> Result<Table> {
    let response = lua.create_table()?;

    response.set(
        "json",
        lua.create_function(|lua, (value, status): (Value, Option<u16>)| {
            let table = lua.create_table()?;
            table.set("status", status.unwrap_or(200))?;
            table.set("json", value)?;
            Ok(table)
        })?,
    )?;
    response.set(
        "text",
        lua.create_function(|lua, (body, status): (String, Option<u16>)| {
            let headers = lua.create_table()?;
            headers.set("content-type", "text/plain; charset=utf-8")?;
            let table = lua.create_table()?;
            table.set("status", status.unwrap_or(200))?;
            table.set("headers", headers)?;
            table.set("body", body)?;
            Ok(table)
        })?,
    )?;
    response.set(
        "redirect",
        lua.create_function(|lua, (location, status): (String, Option<u16>)| {
            let headers = lua.create_table()?;
            headers.set("location", location)?;
            let table = lua.create_table()?;
            table.set("status", status.unwrap_or(302))?;
            table.set("headers", headers)?;
            table.set("body", "")?;
            Ok(table)
        })?,
    )?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(runtime: &LuaRuntime, code: &str) -> Result<Table> {
        let env = runtime.module_env(runtime.create_table()?)?;
        runtime.evaluate(code, Path::new("test.lua"), env)
    }

    #[test]
    fn test_sandbox_removes_dangerous_globals() {
        let runtime = LuaRuntime::new().unwrap();
        let exports = eval(
            &runtime,
            r#"return {
                io = io, debug = debug, load = load, dofile = dofile,
                exec = os.execute, time = os.time,
            }"#,
        )
        .unwrap();
        for name in ["io", "debug", "load", "dofile", "exec"] {
            assert!(exports.get::<Value>(name).unwrap().is_nil(), "{} should be nil", name);
        }
        assert!(exports.get::<Value>("time").unwrap().is_function());
    }

    #[test]
    fn test_deadline_interrupts_busy_loop() {
        let runtime = LuaRuntime::new().unwrap();
        let exports = eval(
            &runtime,
            "return function(n) local i = 0 while n == nil or i < n do i = i + 1 end return i end",
        )
        .unwrap();
        let spin: Function = exports.get("default").unwrap();

        let start = Instant::now();
        let result = with_deadline(start + std::time::Duration::from_millis(50), || {
            spin.call::<i64>(Value::Nil)
        });
        let err = result.unwrap_err().to_string();
        assert!(err.contains("render deadline exceeded"), "{}", err);
        assert!(start.elapsed() < std::time::Duration::from_secs(2));

        // The deadline is gone once the closure returns.
        assert_eq!(spin.call::<i64>(100_000).unwrap(), 100_000);
    }

    #[test]
    fn test_bare_function_becomes_default_export() {
        let runtime = LuaRuntime::new().unwrap();
        let exports = eval(&runtime, "return function() return '<p>hi</p>' end").unwrap();
        let default: Function = exports.get("default").unwrap();
        assert_eq!(default.call::<String>(()).unwrap(), "<p>hi</p>");
    }

    #[test]
    fn test_modules_do_not_share_locals_or_globals() {
        let runtime = LuaRuntime::new().unwrap();
        eval(&runtime, "leaked = 1; return {}").unwrap();
        let exports = eval(&runtime, "return { seen = leaked }").unwrap();
        assert!(exports.get::<Value>("seen").unwrap().is_nil());
    }

    #[test]
    fn test_require_uses_resolution_table() {
        let runtime = LuaRuntime::new().unwrap();
        let dep = runtime.create_table().unwrap();
        dep.set("name", "card").unwrap();
        let resolutions = runtime.create_table().unwrap();
        resolutions.set("./card", dep).unwrap();

        let env = runtime.module_env(resolutions).unwrap();
        let exports = runtime
            .evaluate(
                "local card = require('./card'); return { name = card.name }",
                Path::new("page.lua"),
                env,
            )
            .unwrap();
        assert_eq!(exports.get::<String>("name").unwrap(), "card");

        let err = eval(&runtime, "return require('./missing')").unwrap_err();
        match err {
            FolioError::Runtime { message, .. } => assert!(message.contains("./missing")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_json_and_html_globals() {
        let runtime = LuaRuntime::new().unwrap();
        let exports = eval(
            &runtime,
            r#"return {
                encoded = json.encode({ a = 1 }),
                decoded = json.decode('{"b":[1,2]}').b[2],
                escaped = html.escape("<a href='x'>&</a>"),
            }"#,
        )
        .unwrap();
        assert_eq!(exports.get::<String>("encoded").unwrap(), r#"{"a":1}"#);
        assert_eq!(exports.get::<i64>("decoded").unwrap(), 2);
        assert_eq!(
            exports.get::<String>("escaped").unwrap(),
            "&lt;a href=&#039;x&#039;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_response_helpers() {
        let runtime = LuaRuntime::new().unwrap();
        let exports = eval(
            &runtime,
            r#"return { r = Response.redirect("/login"), t = Response.text("ok", 201) }"#,
        )
        .unwrap();
        let redirect: Table = exports.get("r").unwrap();
        assert_eq!(redirect.get::<u16>("status").unwrap(), 302);
        let headers: Table = redirect.get("headers").unwrap();
        assert_eq!(headers.get::<String>("location").unwrap(), "/login");
        let text: Table = exports.get("t").unwrap();
        assert_eq!(text.get::<u16>("status").unwrap(), 201);
    }

    #[test]
    fn test_runtime_error_carries_file() {
        let runtime = LuaRuntime::new().unwrap();
        let err = eval(&runtime, "error('boom')").unwrap_err();
        match err {
            FolioError::Runtime { file, message } => {
                assert_eq!(file, Path::new("test.lua"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_lua_to_json() {
        let runtime = LuaRuntime::new().unwrap();
        let exports = eval(
            &runtime,
            "return { list = {1, 2, 'x'}, empty = {}, nested = { ok = true, n = 1.5 }, f = print }",
        )
        .unwrap();
        let value = lua_to_json(&Value::Table(exports)).unwrap();
        assert_eq!(value["list"], serde_json::json!([1, 2, "x"]));
        assert_eq!(value["empty"], serde_json::json!({}));
        assert_eq!(value["nested"], serde_json::json!({ "ok": true, "n": 1.5 }));
        assert_eq!(value["f"], JsonValue::Null);
    }

    #[test]
    fn test_non_table_module_is_rejected() {
        let runtime = LuaRuntime::new().unwrap();
        assert!(matches!(eval(&runtime, "return 42"), Err(FolioError::Runtime { .. })));
    }
}
