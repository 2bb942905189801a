pub mod file;
pub mod settings;
pub mod validation;

pub use self::{
    file::File,
    settings::{HashAlgorithmChoice, Settings},
};
