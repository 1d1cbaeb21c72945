pub mod car_params;
pub mod controls;
pub mod thermal_status;
