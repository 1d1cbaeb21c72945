pub mod filters;
pub mod kalman;
pub mod numeric;
pub mod params;
