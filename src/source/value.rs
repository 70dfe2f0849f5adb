//! 结构化值定义
//!
//! 后端存储中一份密钥文档的原样表示

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// 密钥文档中的结构化值
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    /// 空值
    Null,
    /// 布尔值
    Bool(bool),
    /// 数值
    Number(Number),
    /// 字符串
    String(String),
    /// 数组
    Array(Vec<StructuredValue>),
    /// 对象（按键排序，保证展开结果确定）
    Object(BTreeMap<String, StructuredValue>),
}

impl StructuredValue {
    /// 值的类型名称，用于日志
    pub fn kind(&self) -> &'static str {
        match self {
            StructuredValue::Null => "null",
            StructuredValue::Bool(_) => "bool",
            StructuredValue::Number(_) => "number",
            StructuredValue::String(_) => "string",
            StructuredValue::Array(_) => "array",
            StructuredValue::Object(_) => "object",
        }
    }

    /// 是否为对象
    pub fn is_object(&self) -> bool {
        matches!(self, StructuredValue::Object(_))
    }
}

impl From<Value> for StructuredValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => StructuredValue::Null,
            Value::Bool(b) => StructuredValue::Bool(b),
            Value::Number(n) => StructuredValue::Number(n),
            Value::String(s) => StructuredValue::String(s),
            Value::Array(items) => {
                StructuredValue::Array(items.into_iter().map(StructuredValue::from).collect())
            }
            Value::Object(members) => StructuredValue::Object(
                members
                    .into_iter()
                    .map(|(k, v)| (k, StructuredValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<StructuredValue> for Value {
    fn from(value: StructuredValue) -> Self {
        match value {
            StructuredValue::Null => Value::Null,
            StructuredValue::Bool(b) => Value::Bool(b),
            StructuredValue::Number(n) => Value::Number(n),
            StructuredValue::String(s) => Value::String(s),
            StructuredValue::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            StructuredValue::Object(members) => Value::Object(
                members
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

impl From<&str> for StructuredValue {
    fn from(s: &str) -> Self {
        StructuredValue::String(s.to_string())
    }
}

impl From<String> for StructuredValue {
    fn from(s: String) -> Self {
        StructuredValue::String(s)
    }
}

impl From<bool> for StructuredValue {
    fn from(b: bool) -> Self {
        StructuredValue::Bool(b)
    }
}

impl From<i64> for StructuredValue {
    fn from(n: i64) -> Self {
        StructuredValue::Number(Number::from(n))
    }
}

/// 枚举过程中产出的一条密钥，仅在一次加载周期内有效
#[derive(Debug, Clone, PartialEq)]
pub struct SecretNode {
    /// 密钥在存储中的完整路径
    pub path: String,
    /// 密钥文档
    pub value: StructuredValue,
    /// 密钥版本号
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_value() {
        let value = StructuredValue::from(json!({
            "host": "x",
            "port": 5432,
            "tls": true,
            "replicas": ["a", null],
        }));

        let StructuredValue::Object(members) = value else {
            panic!("应为对象");
        };
        assert_eq!(members["host"], StructuredValue::String("x".to_string()));
        assert_eq!(members["port"], StructuredValue::from(5432i64));
        assert_eq!(members["tls"], StructuredValue::Bool(true));
        assert_eq!(
            members["replicas"],
            StructuredValue::Array(vec![StructuredValue::from("a"), StructuredValue::Null])
        );
    }

    #[test]
    fn test_json_conversion_is_lossless() {
        let original = json!({"a": [1, 2.5, {"b": null}], "c": "d"});
        let back = Value::from(StructuredValue::from(original.clone()));
        assert_eq!(back, original);
    }
}
