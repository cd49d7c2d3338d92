mod claims;
mod jwt;

pub use claims::{Claims, ROLE_ADMIN, ROLE_DELIVERY_ADMIN, ROLE_DELIVERY_SUBMIT};
pub use jwt::JwtValidator;
