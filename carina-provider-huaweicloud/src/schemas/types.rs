//! HuaweiCloud-specific type definitions

use carina_core::resource::Value;
use carina_core::schema::{AttributeType, types};
use regex::Regex;

/// Basic permissions a DDM account may hold
pub const DDM_PERMISSIONS: &[&str] = &[
    "CREATE", "DROP", "ALTER", "INDEX", "INSERT", "DELETE", "UPDATE", "SELECT",
];

/// DDM account name: starts with a letter, then letters, digits or `_`,
/// at most 32 characters
pub fn ddm_account_name() -> AttributeType {
    AttributeType::Custom {
        name: "DdmAccountName".to_string(),
        base: Box::new(types::string_len_between(1, 32)),
        validate: |value| match value {
            Value::String(s) => validate_ddm_account_name(s),
            _ => Err("Expected string".to_string()),
        },
    }
}

fn validate_ddm_account_name(name: &str) -> Result<(), String> {
    let re = Regex::new(r"^[A-Za-z]\w*$").map_err(|e| e.to_string())?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(format!(
            "Invalid account name '{}': must start with a letter and contain only letters, digits and underscores",
            name
        ))
    }
}

/// List of DDM permissions
pub fn ddm_permissions() -> AttributeType {
    AttributeType::List(Box::new(types::string_in(DDM_PERMISSIONS)))
}

/// `"true"` or `"false"` as a string
pub fn bool_string() -> AttributeType {
    types::string_in(&["true", "false"])
}

/// Private CA type
pub fn ca_type() -> AttributeType {
    types::string_in(&["ROOT", "SUBORDINATE"])
}

/// Lifecycle action applied to a private CA
pub fn ca_action() -> AttributeType {
    types::string_in(&["enable", "disable"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_names() {
        let t = ddm_account_name();
        assert!(t.validate(&Value::from("user_1")).is_ok());
        assert!(t.validate(&Value::from("A")).is_ok());
        assert!(t.validate(&Value::from("1user")).is_err());
        assert!(t.validate(&Value::from("user-1")).is_err());
        assert!(t.validate(&Value::from("")).is_err());
        assert!(t.validate(&Value::from("a".repeat(33).as_str())).is_err());
    }

    #[test]
    fn permissions() {
        let t = ddm_permissions();
        let ok = Value::List(vec![Value::from("SELECT"), Value::from("INSERT")]);
        assert!(t.validate(&ok).is_ok());
        let bad = Value::List(vec![Value::from("GRANT")]);
        assert!(t.validate(&bad).is_err());
    }

    #[test]
    fn enums() {
        assert!(bool_string().validate(&Value::from("true")).is_ok());
        assert!(bool_string().validate(&Value::from("yes")).is_err());
        assert!(ca_type().validate(&Value::from("SUBORDINATE")).is_ok());
        assert!(ca_action().validate(&Value::from("delete")).is_err());
    }
}
