//! [`ScriptEngine`] backed by an embedded Rhai interpreter.

use super::{
    is_identifier, Evaluation, FunctionRegistry, NativeFunction, ScriptEngine, ScriptError,
    ScriptValue,
};
use crate::completion::ObjectGraph;
use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Map, NativeCallContext, Scope, AST};
use std::any::TypeId;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// A node of the Rhai object graph as seen by completion.
#[derive(Debug, Clone)]
pub enum RhaiNode {
    /// The global scope: variables, native functions and script functions.
    Global,
    Value(Dynamic),
    /// A function bound by name in the global scope.
    Function(String),
}

pub struct RhaiEngine {
    engine: Engine,
    scope: Scope<'static>,
    /// Functions defined by earlier evaluations.
    definitions: AST,
    natives: BTreeSet<String>,
    /// Callable names from the standard packages.
    builtins: BTreeSet<String>,
    /// Standard functions taking a map first, callable as `map.name()`.
    map_methods: BTreeSet<String>,
    printed: Arc<Mutex<String>>,
}

impl RhaiEngine {
    #[must_use]
    pub fn new() -> Self {
        let printed = Arc::new(Mutex::new(String::new()));
        let mut engine = Engine::new();

        let sink = Arc::clone(&printed);
        engine.on_print(move |text| {
            if let Ok(mut out) = sink.lock() {
                out.push_str(text);
                out.push('\n');
            }
        });
        let sink = Arc::clone(&printed);
        engine.on_debug(move |text, _source, pos| {
            if let Ok(mut out) = sink.lock() {
                if pos.is_none() {
                    out.push_str(text);
                } else {
                    out.push_str(&format!("{pos:?} | {text}"));
                }
                out.push('\n');
            }
        });

        let mut builtins = BTreeSet::new();
        let mut map_methods = BTreeSet::new();
        for signature in engine.gen_fn_signatures(true) {
            let Some((name, receiver)) = parse_signature(&signature) else {
                continue;
            };
            if receiver.is_some_and(is_map_type) {
                map_methods.insert(name.to_string());
            }
            builtins.insert(name.to_string());
        }

        Self {
            engine,
            scope: Scope::new(),
            definitions: AST::default(),
            natives: BTreeSet::new(),
            builtins,
            map_methods,
            printed,
        }
    }

    /// Binds `name` in the global scope, replacing any earlier binding.
    pub fn set_global(&mut self, name: &str, value: impl Into<Dynamic>) {
        self.scope.set_value(name.to_string(), value.into());
    }

    #[must_use]
    pub fn get_global(&self, name: &str) -> Option<Dynamic> {
        self.scope.get_value::<Dynamic>(name)
    }

    fn has_function(&self, name: &str) -> bool {
        self.natives.contains(name)
            || self.builtins.contains(name)
            || self.definitions.iter_functions().any(|f| f.name == name)
    }

    fn take_printed(&self) -> String {
        self.printed
            .lock()
            .map(|mut out| std::mem::take(&mut *out))
            .unwrap_or_default()
    }

    fn run(&mut self, source: &str) -> Result<Option<String>, ScriptError> {
        let ast = self
            .engine
            .compile_with_scope(&self.scope, source)
            .map_err(|e| ScriptError::Compile(e.to_string()))?;

        let program = self.definitions.merge(&ast);
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &program);
        self.definitions = program.clone_functions_only();

        let value = result.map_err(|e| ScriptError::Runtime(e.to_string()))?;
        Ok(if value.is_unit() {
            None
        } else {
            Some(value.to_string())
        })
    }
}

impl Default for RhaiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry for RhaiEngine {
    fn register_function(&mut self, function: NativeFunction) -> Result<(), ScriptError> {
        if !is_identifier(&function.name) {
            return Err(ScriptError::Registration {
                name: function.name,
                reason: "not a valid identifier".to_string(),
            });
        }

        let NativeFunction { name, arity, call } = function;
        let label = name.clone();
        let params = vec![TypeId::of::<Dynamic>(); arity];

        #[allow(deprecated)]
        self.engine.register_raw_fn(
            name.clone(),
            params,
            move |_ctx: NativeCallContext, args: &mut [&mut Dynamic]| -> Result<Dynamic, Box<EvalAltResult>> {
                let values: Vec<ScriptValue> = args.iter().map(|arg| from_dynamic(arg)).collect();
                match call(&values) {
                    Ok(value) => Ok(into_dynamic(value)),
                    Err(message) => Err(format!("{label}: {message}").into()),
                }
            },
        );

        debug!(name = %name, arity, "Registered native function");
        self.natives.insert(name);
        Ok(())
    }
}

impl ScriptEngine for RhaiEngine {
    fn evaluate(&mut self, source: &str) -> Evaluation {
        self.take_printed();
        trace!(len = source.len(), "Evaluating script");
        let value = self.run(source);
        Evaluation {
            printed: self.take_printed(),
            value,
        }
    }
}

impl ObjectGraph for RhaiEngine {
    type Value = RhaiNode;

    fn global(&self) -> RhaiNode {
        RhaiNode::Global
    }

    fn get_property(&self, object: &RhaiNode, name: &str) -> Option<RhaiNode> {
        match object {
            RhaiNode::Global => self
                .scope
                .get_value::<Dynamic>(name)
                .map(RhaiNode::Value)
                .or_else(|| {
                    self.has_function(name)
                        .then(|| RhaiNode::Function(name.to_string()))
                }),
            RhaiNode::Value(value) => {
                let entry = value.read_lock::<Map>()?.get(name).cloned();
                entry.map(RhaiNode::Value).or_else(|| {
                    self.map_methods
                        .contains(name)
                        .then(|| RhaiNode::Function(name.to_string()))
                })
            }
            RhaiNode::Function(_) => None,
        }
    }

    fn own_properties(&self, object: &RhaiNode) -> Vec<String> {
        match object {
            RhaiNode::Global => {
                let mut names: Vec<String> =
                    self.scope.iter().map(|(name, _, _)| name.to_string()).collect();
                names.extend(self.natives.iter().cloned());
                names.extend(self.definitions.iter_functions().map(|f| f.name.to_string()));
                names
            }
            RhaiNode::Value(value) => value
                .read_lock::<Map>()
                .map(|map| map.keys().map(ToString::to_string).collect())
                .unwrap_or_default(),
            RhaiNode::Function(_) => Vec::new(),
        }
    }

    fn inherited_properties(&self, object: &RhaiNode) -> Vec<String> {
        match object {
            RhaiNode::Global => self.builtins.iter().cloned().collect(),
            RhaiNode::Value(value) if value.is::<Map>() => self.map_methods.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn is_object(&self, value: &RhaiNode) -> bool {
        match value {
            RhaiNode::Global => true,
            RhaiNode::Value(v) => v.is::<Map>(),
            RhaiNode::Function(_) => false,
        }
    }

    fn is_callable(&self, value: &RhaiNode) -> bool {
        match value {
            RhaiNode::Function(_) => true,
            RhaiNode::Value(v) => v.is::<FnPtr>(),
            RhaiNode::Global => false,
        }
    }
}

/// Splits `name(first: Type, ...) -> Ret` into the function name and the
/// first parameter's type. Operators, getters and indexers are skipped.
fn parse_signature(signature: &str) -> Option<(&str, Option<&str>)> {
    let (name, rest) = signature.split_once('(')?;
    if !is_identifier(name) {
        return None;
    }
    let params = rest.split_once(')').map_or(rest, |(params, _)| params);
    let first = params.split(',').next().unwrap_or_default();
    let receiver = first.split_once(':').map(|(_, ty)| ty.trim());
    Some((name, receiver))
}

fn is_map_type(ty: &str) -> bool {
    let ty = ty.trim_start_matches("&mut ").trim_start_matches('&').trim();
    let ty = ty.rsplit("::").next().unwrap_or(ty);
    ty.eq_ignore_ascii_case("map")
}

fn from_dynamic(value: &Dynamic) -> ScriptValue {
    if value.is_unit() {
        ScriptValue::Unit
    } else if let Ok(b) = value.as_bool() {
        ScriptValue::Bool(b)
    } else if let Ok(i) = value.as_int() {
        ScriptValue::Int(i)
    } else if let Ok(x) = value.as_float() {
        ScriptValue::Float(x)
    } else if value.is_string() {
        ScriptValue::Str(value.clone().into_string().unwrap_or_default())
    } else {
        ScriptValue::Str(value.to_string())
    }
}

fn into_dynamic(value: ScriptValue) -> Dynamic {
    match value {
        ScriptValue::Unit => Dynamic::UNIT,
        ScriptValue::Bool(b) => Dynamic::from(b),
        ScriptValue::Int(i) => Dynamic::from(i),
        ScriptValue::Float(x) => Dynamic::from(x),
        ScriptValue::Str(s) => Dynamic::from(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::complete;

    fn eval(engine: &mut RhaiEngine, source: &str) -> Result<Option<String>, ScriptError> {
        engine.evaluate(source).value
    }

    #[test]
    fn arithmetic_renders_value() {
        let mut engine = RhaiEngine::new();
        assert_eq!(eval(&mut engine, "21*2").unwrap().as_deref(), Some("42"));
        assert_eq!(eval(&mut engine, "1+1").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn globals_persist_between_evaluations() {
        let mut engine = RhaiEngine::new();
        assert_eq!(eval(&mut engine, "let x = 40;").unwrap(), None);
        assert_eq!(eval(&mut engine, "x + 2").unwrap().as_deref(), Some("42"));
    }

    #[test]
    fn functions_persist_between_evaluations() {
        let mut engine = RhaiEngine::new();
        eval(&mut engine, "fn double(n) { n * 2 }").unwrap();
        assert_eq!(eval(&mut engine, "double(21)").unwrap().as_deref(), Some("42"));
        assert_eq!(complete(&engine, "dou"), vec!["double("]);
    }

    #[test]
    fn print_output_is_captured() {
        let mut engine = RhaiEngine::new();
        let evaluation = engine.evaluate(r#"print("hello"); 7"#);
        assert_eq!(evaluation.printed, "hello\n");
        assert_eq!(evaluation.value.unwrap().as_deref(), Some("7"));
        assert_eq!(engine.evaluate("8").printed, "");
    }

    #[test]
    fn compile_and_runtime_errors_are_distinguished() {
        let mut engine = RhaiEngine::new();
        assert!(matches!(eval(&mut engine, "let = ;"), Err(ScriptError::Compile(_))));
        assert!(matches!(eval(&mut engine, "undefined_thing + 1"), Err(ScriptError::Runtime(_))));
    }

    #[test]
    fn printed_output_survives_runtime_error() {
        let mut engine = RhaiEngine::new();
        let evaluation = engine.evaluate(r#"print("before"); throw "boom";"#);
        assert_eq!(evaluation.printed, "before\n");
        assert!(evaluation.value.is_err());
    }

    #[test]
    fn native_functions_are_callable() {
        let mut engine = RhaiEngine::new();
        engine
            .register_function(NativeFunction::new("shout", 1, |args| match args {
                [ScriptValue::Str(s)] => Ok(ScriptValue::Str(s.to_uppercase())),
                _ => Err("expected a string".to_string()),
            }))
            .unwrap();
        assert_eq!(eval(&mut engine, r#"shout("hi")"#).unwrap().as_deref(), Some("HI"));

        let err = eval(&mut engine, "shout(1)").unwrap_err();
        assert!(err.to_string().contains("expected a string"));
    }

    #[test]
    fn native_arguments_convert() {
        let mut engine = RhaiEngine::new();
        engine
            .register_function(NativeFunction::new("describe", 3, |args| {
                Ok(ScriptValue::Str(format!("{args:?}")))
            }))
            .unwrap();
        let rendered = eval(&mut engine, "describe(true, 2, 0.5)").unwrap().unwrap();
        assert_eq!(rendered, "[Bool(true), Int(2), Float(0.5)]");
    }

    #[test]
    fn invalid_function_names_are_rejected() {
        let mut engine = RhaiEngine::new();
        let result = engine.register_function(NativeFunction::new("no spaces", 0, |_| {
            Ok(ScriptValue::Unit)
        }));
        assert!(matches!(result, Err(ScriptError::Registration { .. })));
    }

    #[test]
    fn completion_walks_object_maps() {
        let mut engine = RhaiEngine::new();
        eval(&mut engine, "let obj = #{apple: 1, apricot: 2, banana: 3};").unwrap();
        assert_eq!(complete(&engine, "obj.ap"), vec!["apple", "apricot"]);
        let all = complete(&engine, "obj.");
        let keys: Vec<&str> = all
            .iter()
            .map(String::as_str)
            .filter(|name| !name.ends_with('('))
            .collect();
        assert_eq!(keys, vec!["apple", "apricot", "banana"]);
    }

    #[test]
    fn completion_lists_map_methods_and_global_functions() {
        let mut engine = RhaiEngine::new();
        eval(&mut engine, "let obj = #{apple: 1, apricot: 2, banana: 3};").unwrap();
        assert_eq!(eval(&mut engine, "obj.keys().len()").unwrap().as_deref(), Some("3"));

        assert!(complete(&engine, "obj.ke").contains(&"keys(".to_string()));
        assert!(complete(&engine, "obj.le").contains(&"len(".to_string()));
        assert!(complete(&engine, "pri").contains(&"print(".to_string()));
        assert!(!complete(&engine, "obj.").contains(&"+(".to_string()));
    }

    #[test]
    fn map_keys_shadow_methods() {
        let mut engine = RhaiEngine::new();
        eval(&mut engine, "let stats = #{len: 5};").unwrap();
        assert_eq!(complete(&engine, "stats.len"), vec!["len"]);
    }

    #[test]
    fn signatures() {
        assert_eq!(
            parse_signature("keys(map: &mut Map) -> Array"),
            Some(("keys", Some("&mut Map")))
        );
        assert_eq!(parse_signature("timestamp() -> Instant"), Some(("timestamp", None)));
        assert_eq!(parse_signature("+(a: i64, b: i64) -> i64"), None);
        assert_eq!(parse_signature("get$len(s: &mut String) -> i64"), None);
        assert!(is_map_type("&mut Map"));
        assert!(is_map_type("rhai::Map"));
        assert!(!is_map_type("Array"));
    }

    #[test]
    fn completion_of_nested_maps_and_function_pointers() {
        let mut engine = RhaiEngine::new();
        eval(
            &mut engine,
            r#"fn helper() { 1 } let cfg = #{server: #{port: 80, start: Fn("helper")}};"#,
        )
        .unwrap();
        assert_eq!(complete(&engine, "cfg.server.po"), vec!["port"]);
        assert_eq!(complete(&engine, "cfg.server.st"), vec!["start("]);
        assert!(complete(&engine, "cfg.server.port.").is_empty());
        assert!(complete(&engine, "nonexistent.deep.path.").is_empty());
    }

    #[test]
    fn unit_intermediate_is_empty() {
        let mut engine = RhaiEngine::new();
        eval(&mut engine, "let nothing = ();").unwrap();
        assert!(complete(&engine, "nothing.").is_empty());
    }

    #[test]
    fn set_global_is_visible_to_scripts_and_completion() {
        let mut engine = RhaiEngine::new();
        engine.set_global("answer", 42_i64);
        assert_eq!(eval(&mut engine, "answer").unwrap().as_deref(), Some("42"));
        assert_eq!(complete(&engine, "ans"), vec!["answer"]);
        assert!(engine.get_global("answer").is_some());
    }
}
