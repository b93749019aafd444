//! Input binding
//!
//! Converts the untyped input payload of a task into the input type of a
//! typed handler.

use baton_core::domain::task::Task;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::BoxError;

/// Decodes a task's input payload into a handler's input type
pub trait InputBinder: Send + Sync + 'static {
    /// Populates a `T` from `input`.
    ///
    /// An absent or empty payload must yield `T::default()` without error so
    /// handlers tolerate tasks scheduled without input.
    fn bind<T>(&self, input: Option<&Map<String, Value>>) -> Result<T, BoxError>
    where
        T: DeserializeOwned + Default;
}

/// Binder that decodes the payload as a JSON object using the type's serde
/// field names
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBinder;

impl InputBinder for JsonBinder {
    fn bind<T>(&self, input: Option<&Map<String, Value>>) -> Result<T, BoxError>
    where
        T: DeserializeOwned + Default,
    {
        match input {
            Some(map) if !map.is_empty() => Ok(serde_json::from_value(Value::Object(map.clone()))?),
            _ => Ok(T::default()),
        }
    }
}

/// The input of a task did not match the handler's input type
#[derive(Debug, Error)]
#[error("input binding error for task {task_def_name}: {source}")]
pub struct BindingError {
    pub task_def_name: String,
    #[source]
    pub source: BoxError,
}

impl BindingError {
    pub fn new(task_def_name: impl Into<String>, source: BoxError) -> Self {
        Self {
            task_def_name: task_def_name.into(),
            source,
        }
    }
}

/// Binds the input of `task`, tagging failures with the task definition name
pub fn bind_task_input<T, B>(binder: &B, task: &Task) -> Result<T, BindingError>
where
    T: DeserializeOwned + Default,
    B: InputBinder,
{
    binder
        .bind(task.input_data.as_ref())
        .map_err(|source| BindingError::new(task.def_name(), source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    struct Input {
        a: i64,
        #[serde(default)]
        label: Option<String>,
    }

    fn task_with_input(input: Option<Value>) -> Task {
        Task {
            task_id: "t-1".to_string(),
            task_def_name: "typed".to_string(),
            input_data: input.and_then(|v| v.as_object().cloned()),
            ..Default::default()
        }
    }

    #[test]
    fn test_bind_decodes_fields() {
        let task = task_with_input(Some(json!({"a": 5, "label": "five"})));
        let input: Input = bind_task_input(&JsonBinder, &task).unwrap();
        assert_eq!(
            input,
            Input {
                a: 5,
                label: Some("five".to_string())
            }
        );
    }

    #[test]
    fn test_bind_absent_or_empty_input_is_default() {
        let input: Input = bind_task_input(&JsonBinder, &task_with_input(None)).unwrap();
        assert_eq!(input, Input::default());

        let input: Input = bind_task_input(&JsonBinder, &task_with_input(Some(json!({})))).unwrap();
        assert_eq!(input, Input::default());
    }

    #[test]
    fn test_bind_shape_mismatch_names_task() {
        let task = task_with_input(Some(json!({"a": "not_an_int"})));
        let err = bind_task_input::<Input, _>(&JsonBinder, &task).unwrap_err();

        assert_eq!(err.task_def_name, "typed");
        let message = err.to_string();
        assert!(message.contains("input binding error"));
        assert!(message.contains("typed"));
    }

    #[test]
    fn test_bind_ignores_unknown_keys() {
        let task = task_with_input(Some(json!({"a": 1, "extra": [1, 2, 3]})));
        let input: Input = bind_task_input(&JsonBinder, &task).unwrap();
        assert_eq!(input.a, 1);
    }
}
