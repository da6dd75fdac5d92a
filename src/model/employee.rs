use super::role::Role;

/// Provisioned by the identity collaborator; the leave engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    pub id: u64,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    /// Weak link to the employee's manager, if any.
    pub manager_id: Option<u64>,
}

impl Employee {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn reports_to(&self, manager_id: u64) -> bool {
        self.manager_id == Some(manager_id)
    }
}
