//! Aggregates module
pub mod audit;
pub mod cart;
pub mod order;
pub mod payment;
pub mod product;
pub mod user;

pub use audit::{AuditAction, AuditEntry};
pub use cart::{CartEntry, CartLine, CartView};
pub use order::{Order, OrderError, OrderItem, OrderStatus};
pub use payment::{Payment, PaymentError, PaymentMethod, PaymentStatus};
pub use product::{Product, ProductError};
pub use user::{Role, User};
