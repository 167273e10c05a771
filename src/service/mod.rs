//! Table, user and procedure services over the safe SQL builder.

mod crud;
pub mod password;
mod users;
mod validation;
pub use crud::TableService;
pub use users::{LoggedIn, UserService};
pub use validation::RequestValidator;
