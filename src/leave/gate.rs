//! Who may act on or see a leave request.
//!
//! Callers pass employee records loaded from the store, never roles taken from a token.

use crate::model::{employee::Employee, leave_request::LeaveRequest};

/// True iff `decider` is the manager of the request's owner.
pub fn can_decide(decider: &Employee, owner: &Employee, request: &LeaveRequest) -> bool {
    owner.id == request.employee_id && owner.reports_to(decider.id)
}

/// The owner, the owner's manager, and admins may view a request.
pub fn can_view(viewer: &Employee, owner: &Employee, request: &LeaveRequest) -> bool {
    viewer.id == request.employee_id || can_decide(viewer, owner, request) || viewer.is_admin()
}
