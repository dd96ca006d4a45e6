#![allow(missing_docs)]

diesel::table! {
    bricks (brickname) {
        brickname -> Text,
        brickid -> Int4,
        brickrow -> Int4,
        brickcol -> Int4,
        brickq -> Int2,
        ra -> Float8,
        dec -> Float8,
        ra1 -> Float8,
        dec1 -> Float8,
        ra2 -> Float8,
        dec2 -> Float8,
        nobs_med_g -> Int2,
        nobs_med_r -> Int2,
        nobs_med_z -> Int2,
        nobs_max_g -> Int2,
        nobs_max_r -> Int2,
        nobs_max_z -> Int2,
    }
}
