pub mod alert;
pub mod customer;
pub mod item;
pub mod movement;
pub mod quantity;

pub use alert::{AlertType, Entity as Alert};
pub use customer::{CustomerStatus, Entity as Customer};
pub use item::{Entity as Item, ItemStatus};
pub use movement::{Entity as Movement, MovementKind};
