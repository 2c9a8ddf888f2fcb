pub mod conns;
pub mod run;
