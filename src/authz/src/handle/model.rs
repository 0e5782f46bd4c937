//! Built-in RBAC model for the policy engine

use crate::error::Result;
use casbin::DefaultModel;
use std::path::Path;

/// Request: (subject, object, action). Grants: (role, object, action).
/// Assignments: (user, role). Allow-only effect.
pub const RBAC_MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

/// Parse the built-in model
pub async fn rbac_model() -> Result<DefaultModel> {
    Ok(DefaultModel::from_str(RBAC_MODEL).await?)
}

/// Load a model definition from disk
pub async fn model_from_file(path: impl AsRef<Path>) -> Result<DefaultModel> {
    Ok(DefaultModel::from_file(path).await?)
}
