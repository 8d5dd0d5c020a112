// API 边界归一化
//
// 后端历史上对同一逻辑字段使用过多个名字（`_id` / `id`，
// 成员角色散落在 `role` / `membershipRole` / `membership.role`），
// 在反序列化为领域模型之前统一映射到规范字段

use serde_json::{Map, Value};

/// 递归地把 `_id` 映射为 `id`
///
/// 两者同时存在时保留 `id`，丢弃 `_id`
pub fn normalize_ids(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(legacy) = map.remove("_id") {
                if !map.contains_key("id") {
                    map.insert("id".to_string(), stringify_id(legacy));
                }
            } else if let Some(id) = map.remove("id") {
                map.insert("id".to_string(), stringify_id(id));
            }
            for (_, child) in map.iter_mut() {
                normalize_ids(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_ids),
        _ => {}
    }
}

/// ObjectId 偶尔以 `{ "$oid": "..." }` 或数字形式出现
fn stringify_id(id: Value) -> Value {
    match id {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Object(ref map) => match map.get("$oid").and_then(Value::as_str) {
            Some(oid) => Value::String(oid.to_string()),
            None => id,
        },
        other => other,
    }
}

/// 把成员角色统一写入 `role`
///
/// 优先级：`role` > `membershipRole` > `membership.role`
pub fn normalize_membership_role(map: &mut Map<String, Value>) {
    let has_role = map.get("role").map(|r| r.is_string()).unwrap_or(false);
    if has_role {
        return;
    }

    let role = map
        .get("membershipRole")
        .and_then(Value::as_str)
        .or_else(|| {
            map.get("membership")
                .and_then(|m| m.get("role"))
                .and_then(Value::as_str)
        })
        .map(str::to_string);

    if let Some(role) = role {
        map.insert("role".to_string(), Value::String(role));
    }
}

/// 对数组或单个对象中的每个成员关系执行角色归一化
pub fn normalize_memberships(value: &mut Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Value::Object(map) = item {
                    normalize_membership_role(map);
                }
            }
        }
        Value::Object(map) => normalize_membership_role(map),
        _ => {}
    }
}

/// 拆开 `{ success, data }` 信封；其它形式原样返回
///
/// 部分接口把载荷放在具名字段里（如 `document`、`comments`），
/// `keys` 按顺序尝试这些字段
pub fn unwrap_envelope(mut body: Value, keys: &[&str]) -> Value {
    if let Value::Object(map) = &mut body {
        for key in keys {
            if let Some(inner) = map.remove(*key) {
                return inner;
            }
        }
        if let Some(inner) = map.remove("data") {
            return inner;
        }
    }
    body
}
