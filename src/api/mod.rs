use actix_web::web;

use crate::leave::LeaveService;
use crate::store::MySqlStore;

pub mod balance;
pub mod leave_request;
pub mod notification;

/// Engine instance shared by all handlers.
pub type Service = web::Data<LeaveService<MySqlStore>>;
