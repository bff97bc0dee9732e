pub mod data_type;
pub mod money;
pub mod validate;

pub use data_type::DataType;
pub use money::Money;
pub use validate::DataValidator;
