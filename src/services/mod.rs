pub mod categories;
pub mod products;

pub use categories::CategoryService;
pub use products::ProductService;
