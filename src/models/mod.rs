pub mod child;
pub mod growth_result;
pub mod measurement;
pub mod reference;
pub mod requester;
pub mod subscription;
pub mod velocity;
