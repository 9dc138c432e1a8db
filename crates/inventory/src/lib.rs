//! Inventory ledger: supplier products and their stock (event-sourced).
//!
//! Stock only moves through events, and every event carries the resulting
//! stock so the ledger can be audited without replaying arithmetic.

pub mod product;

pub use product::{
    AvailabilityChanged, CreateProduct, Product, ProductCommand, ProductCreated, ProductEvent,
    ProductId, ProductStatus, ProductUpdated, ReleaseStock, ReserveStock, Restock, Restocked,
    SetAvailability, StockReleased, StockReserved, UpdateProduct,
};
