mod checkout;
mod coupons;
mod health_check;
mod sessions;
mod test_utils;
