pub mod current_inventory;
pub mod inventory_transaction;
pub mod part;
pub mod part_location;
pub mod stock_count;
pub mod stock_count_detail;
pub mod warehouse;
pub mod warehouse_location;
