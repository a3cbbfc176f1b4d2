//! IAM policy shapes shared by databases and backups.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

/// An access policy. `etag` must be sent back unchanged on write so that a
/// concurrent writer holding a stale copy is rejected with `ABORTED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
}

impl Policy {
    pub fn members(&self, role: &str) -> impl Iterator<Item = &str> + '_ {
        let role = role.to_string();
        self.bindings
            .iter()
            .filter(move |b| b.role == role)
            .flat_map(|b| b.members.iter().map(String::as_str))
    }

    /// Grants `role` to `member`. Returns false if it was already granted.
    pub fn add_member(&mut self, role: &str, member: &str) -> bool {
        let binding = match self
            .bindings
            .iter_mut()
            .position(|b| b.role == role && b.condition.is_none())
        {
            Some(i) => &mut self.bindings[i],
            None => {
                self.bindings.push(Binding {
                    role: role.to_string(),
                    ..Binding::default()
                });
                let last = self.bindings.len() - 1;
                &mut self.bindings[last]
            }
        };
        if binding.members.iter().any(|m| m == member) {
            return false;
        }
        binding.members.push(member.to_string());
        true
    }

    /// Revokes `role` from `member`, dropping bindings left empty.
    pub fn remove_member(&mut self, role: &str, member: &str) -> bool {
        let mut removed = false;
        for binding in self.bindings.iter_mut().filter(|b| b.role == role) {
            let before = binding.members.len();
            binding.members.retain(|m| m != member);
            removed |= binding.members.len() != before;
        }
        self.bindings.retain(|b| !b.members.is_empty());
        removed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestIamPermissionsResponse {
    #[serde(default)]
    pub permissions: Vec<String>,
}
