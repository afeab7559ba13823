//! Attendance export input.

pub mod reader;

pub use reader::{decode, encode, separator_byte, AttendanceReader, AttendanceRecord, AttendanceSheet};
