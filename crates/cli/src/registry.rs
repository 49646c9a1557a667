//! Built-in wrapped functions

use comliner_core::{
    Arguments, Conversion, FnFunction, InvocationError, Parameter, Signature, ValueType,
    WrappedFunction, number_value,
};
use serde_json::{Value, json};

/// Functions the binary can run, in registration order
pub struct Registry {
    functions: Vec<FnFunction>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
        }
    }

    pub fn register(&mut self, function: FnFunction) {
        self.functions.push(function);
    }

    /// The built-in functions
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register(FnFunction::new(
            Signature::new("scale")
                .param(Parameter::required("x"))
                .param(Parameter::optional("factor", json!(2))),
            |args: &Arguments| Ok(number_value(args.number("x")? * args.number("factor")?)),
        ));

        registry.register(FnFunction::new(
            Signature::new("add")
                .param(Parameter::required("a"))
                .param(Parameter::optional("b", json!(0))),
            |args: &Arguments| Ok(number_value(args.number("a")? + args.number("b")?)),
        ));

        registry.register(FnFunction::new(
            Signature::new("mean").param(
                Parameter::required("values").with_preproc(Conversion::ListOf(ValueType::Float)),
            ),
            |args: &Arguments| {
                let values = args.numbers("values")?;
                if values.is_empty() {
                    return Err(InvocationError::new("mean of an empty list"));
                }
                Ok(number_value(values.iter().sum::<f64>() / values.len() as f64))
            },
        ));

        registry.register(FnFunction::new(
            Signature::new("stats")
                .param(Parameter::required("values"))
                .outputs(["min", "max", "mean"]),
            |args: &Arguments| {
                let values = args.numbers("values")?;
                if values.is_empty() {
                    return Err(InvocationError::new("stats of an empty list"));
                }
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                Ok(Value::Array(vec![
                    number_value(min),
                    number_value(max),
                    number_value(mean),
                ]))
            },
        ));

        registry.register(FnFunction::new(Signature::new("touch"), |_: &Arguments| {
            Ok(Value::Bool(true))
        }));

        registry
    }

    pub fn get(&self, name: &str) -> Option<&dyn WrappedFunction> {
        self.functions
            .iter()
            .find(|f| f.signature().name == name)
            .map(|f| f as &dyn WrappedFunction)
    }

    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.functions.iter().map(|f| f.signature())
    }

    pub fn names(&self) -> Vec<&str> {
        self.signatures().map(|s| s.name.as_str()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
