pub mod age;
pub mod assessment;
pub mod classification;
pub mod interpolation;
pub mod quota;
pub mod validation;
pub mod velocity;
