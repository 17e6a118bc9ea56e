//! Pre-handler connection admission control, run once per accepted TCP
//! connection before any request on it is parsed.

use crate::http::response::{Handled, Response};
use std::{future::Future, net::SocketAddr, pin::Pin};

/// Accepts or rejects a connection before the first request is read.
/// `filter` runs synchronously for cheap checks (IP allow/deny lists,
/// connection counters); `filter_async` runs afterwards for checks that
/// need I/O (a database lookup, a geo-IP service).
pub trait ConnectionFilter: Sync + Send + 'static {
    fn filter(
        &self,
        client_addr: SocketAddr,
        server_addr: SocketAddr,
        error_response: &mut Response,
    ) -> Result<(), Handled>;

    fn filter_async<'a>(
        &'a self,
        #[allow(unused_variables)] client_addr: SocketAddr,
        #[allow(unused_variables)] server_addr: SocketAddr,
        #[allow(unused_variables)] error_response: &'a mut Response,
    ) -> Pin<Box<dyn Future<Output = Result<(), Handled>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

impl ConnectionFilter for () {
    fn filter(&self, _: SocketAddr, _: SocketAddr, _: &mut Response) -> Result<(), Handled> {
        Ok(())
    }
}
