mod spin;
mod table;
