//! A stub payment gateway for tests. Always creates a checkout with a predictable reference.

use crate::gateway::{CreateCheckoutRequest, GatewayCheckout, GatewayError, PaymentGatewayClient};

#[derive(Debug, Clone, Default)]
pub struct StubGateway;

impl PaymentGatewayClient for StubGateway {
    async fn create_checkout(&self, request: CreateCheckoutRequest) -> Result<GatewayCheckout, GatewayError> {
        Ok(GatewayCheckout {
            gateway_ref: format!("gw-{}", request.order_id),
            redirect_url: format!("https://gateway.test/checkout/gw-{}", request.order_id),
        })
    }
}

/// For flows that never touch the gateway.
pub fn no_gateway() -> Option<StubGateway> {
    None
}
