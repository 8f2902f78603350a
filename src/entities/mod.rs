// ABOUTME: SeaORM entities module for the catalog and order tables
// ABOUTME: Exports entity definitions for users, articles, orders, and order items

pub mod article;
pub mod order;
pub mod order_item;
pub mod user;
