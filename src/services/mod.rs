pub mod customers;
pub mod items;
pub mod ledger;

pub use customers::CustomerService;
pub use items::ItemService;
pub use ledger::LedgerEngine;
