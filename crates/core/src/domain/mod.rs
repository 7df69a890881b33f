pub mod decision;
pub mod license;
pub mod listing;
pub mod session;
pub mod track;
