pub mod cart_service;
pub mod checkout_service;

pub use cart_service::{
    AddToCartInput, CartMergeOutcome, CartService, CartWithItems, CreateCartInput, UnmergedLine,
};
pub use checkout_service::{CheckoutInput, CheckoutService};
