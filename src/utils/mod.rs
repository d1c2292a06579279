mod models;

pub(crate) use self::models::cell;
pub(crate) use self::models::sync;
