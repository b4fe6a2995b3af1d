mod support;

mod test_admin_view;
mod test_rate_limiter;
