//! 结构化值展开
//!
//! 将任意嵌套的密钥文档展开为以分隔符连接的扁平配置键

use crate::source::value::StructuredValue;
use serde_json::Number;

/// 默认的键分隔符
pub const DEFAULT_SEPARATOR: char = ':';

/// 扁平化后的一条配置项
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlatEntry {
    /// 配置键
    pub key: String,
    /// 配置值，`None` 表示显式的空值
    pub value: Option<String>,
}

impl FlatEntry {
    fn new(key: String, value: Option<String>) -> Self {
        Self { key, value }
    }
}

/// 配置键的生成规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFormat {
    /// 键分隔符
    pub separator: char,
    /// 需要替换为分隔符的额外字符
    pub normalize_chars: Vec<char>,
    /// 键前缀
    pub key_prefix: Option<String>,
    /// 是否在键中省略密钥路径
    pub omit_secret_path: bool,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            normalize_chars: Vec::new(),
            key_prefix: None,
            omit_secret_path: false,
        }
    }
}

impl KeyFormat {
    /// 将配置的额外字符替换为分隔符
    pub fn normalize(&self, segment: &str) -> String {
        if self.normalize_chars.is_empty() {
            return segment.to_string();
        }

        segment
            .chars()
            .map(|c| {
                if self.normalize_chars.contains(&c) {
                    self.separator
                } else {
                    c
                }
            })
            .collect()
    }

    /// 连接父键与子键，父键为空时不添加分隔符
    pub fn join(&self, parent: &str, child: &str) -> String {
        if parent.is_empty() {
            child.to_string()
        } else {
            format!("{}{}{}", parent, self.separator, child)
        }
    }

    /// 由密钥路径生成该密钥所有配置项共享的基础键
    ///
    /// # 参数
    /// * `base_path` - 配置源的根路径
    /// * `secret_path` - 密钥的完整路径
    ///
    /// # 返回
    /// * `String` - 基础键，可能为空
    pub fn secret_key(&self, base_path: &str, secret_path: &str) -> String {
        // 省略密钥路径时前缀一并省略，文档成员直接成为顶层键
        if self.omit_secret_path {
            return String::new();
        }

        let base = base_path.trim_matches('/');
        let path = secret_path.trim_matches('/');
        let rest = match path.strip_prefix(base) {
            Some(rest) if base.is_empty() || rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        };
        let relative = rest
            .trim_matches('/')
            .replace('/', &self.separator.to_string());

        let key = match &self.key_prefix {
            Some(prefix) if !prefix.is_empty() && relative.is_empty() => prefix.clone(),
            Some(prefix) if !prefix.is_empty() => self.join(prefix, &relative),
            _ => relative,
        };
        self.normalize(&key)
    }

    /// 展开一份密钥文档
    ///
    /// # 参数
    /// * `base_key` - 基础键
    /// * `value` - 密钥文档
    ///
    /// # 返回
    /// * `Vec<FlatEntry>` - 扁平配置项，顺序确定
    pub fn flatten(&self, base_key: &str, value: &StructuredValue) -> Vec<FlatEntry> {
        let mut entries = Vec::new();
        self.flatten_into(base_key.to_string(), value, &mut entries);
        entries
    }

    fn flatten_into(&self, key: String, value: &StructuredValue, out: &mut Vec<FlatEntry>) {
        match value {
            StructuredValue::Null => out.push(FlatEntry::new(key, None)),
            StructuredValue::Bool(b) => out.push(FlatEntry::new(key, Some(b.to_string()))),
            StructuredValue::Number(n) => {
                out.push(FlatEntry::new(key, Some(decimal_string(n))))
            }
            StructuredValue::String(s) => out.push(FlatEntry::new(key, Some(s.clone()))),
            StructuredValue::Object(members) => {
                for (name, member) in members {
                    let child = self.join(&key, &self.normalize(name));
                    self.flatten_into(child, member, out);
                }
            }
            StructuredValue::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let child = self.join(&key, &index.to_string());
                    self.flatten_into(child, item, out);
                }
            }
        }
    }
}

/// 使用分隔符 `:` 且不做字符替换的展开
pub fn flatten(base_key: &str, value: &StructuredValue) -> Vec<FlatEntry> {
    KeyFormat::default().flatten(base_key, value)
}

/// 与区域设置无关的十进制表示，不使用科学计数法
fn decimal_string(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }

    let rendered = n.to_string();
    if rendered.contains(['e', 'E']) {
        // f64 的 Display 总是输出完整小数
        n.as_f64().map(|f| f.to_string()).unwrap_or(rendered)
    } else {
        rendered
    }
}
