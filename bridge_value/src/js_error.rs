use std::collections::BTreeMap;

/// The fixed set of JS error constructors the codec recognizes by name.
/// Any other constructor packs with `base: None` and unpacks into a generic
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsErrorClass {
    EvalError,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
    UriError,
}

impl JsErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            JsErrorClass::EvalError => "EvalError",
            JsErrorClass::RangeError => "RangeError",
            JsErrorClass::ReferenceError => "ReferenceError",
            JsErrorClass::SyntaxError => "SyntaxError",
            JsErrorClass::TypeError => "TypeError",
            JsErrorClass::UriError => "URIError",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "EvalError" => JsErrorClass::EvalError,
            "RangeError" => JsErrorClass::RangeError,
            "ReferenceError" => JsErrorClass::ReferenceError,
            "SyntaxError" => JsErrorClass::SyntaxError,
            "TypeError" => JsErrorClass::TypeError,
            "URIError" => JsErrorClass::UriError,
            _ => return None,
        })
    }
}

/// An error value round-tripped through the `'e'` envelope: constructor
/// name (from the fixed set, or `None` for a generic error), message,
/// stack, and any own enumerable extra properties the original carried.
///
/// This is the Rust stand-in for a thrown JS `Error` instance: a bridgeable
/// method that wants its failure to carry a recognizable class returns
/// `Err(JsError::new(...))`; one that just wants a generic error returns
/// `Err(JsError::generic(message))`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsError {
    pub class: Option<JsErrorClass>,
    pub message: String,
    pub stack: String,
    pub extra: BTreeMap<String, crate::PackedData>,
}

impl JsError {
    pub fn new(class: JsErrorClass, message: impl Into<String>) -> Self {
        let message = message.into();
        JsError {
            stack: format!("{}: {message}", class.as_str()),
            class: Some(class),
            message,
            extra: BTreeMap::new(),
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        let message = message.into();
        JsError {
            stack: format!("Error: {message}"),
            class: None,
            message,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: crate::PackedData) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

impl std::fmt::Display for JsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for JsError {}
