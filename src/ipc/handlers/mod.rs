pub mod attendance;
pub mod backup;
pub mod calendar;
pub mod certificates;
pub mod core;
pub mod fees;
pub mod hostel;
pub mod notifications;
pub mod promotion;
pub mod results;
pub mod settings;
pub mod staff;
pub mod students;
