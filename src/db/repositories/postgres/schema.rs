//! Diesel table definitions for the raw transactional tables.
//!
//! Only the raw tables are declared here: the cache tables are created and
//! dropped at runtime by the lifecycle actions and are always addressed
//! through runtime SQL.

diesel::table! {
    bezettingsdata (bikepark_id, stamp, interval_min) {
        bikepark_id -> Text,
        stamp -> Timestamp,
        capacity -> Integer,
        occupation -> Integer,
        interval_min -> Integer,
        fillup -> Bool,
        source -> Nullable<Text>,
    }
}

diesel::table! {
    transacties (id) {
        id -> BigInt,
        bikepark_id -> Text,
        stamp -> Timestamp,
        amount -> Double,
    }
}

diesel::table! {
    stallingsduur (id) {
        id -> BigInt,
        bikepark_id -> Text,
        stamp -> Timestamp,
        duration_min -> Integer,
    }
}
