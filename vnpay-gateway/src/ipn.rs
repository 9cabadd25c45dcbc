//! Acknowledgement codes for the server-to-server notification (IPN).

use rental_types::IpnResponse;

/// Response codes the gateway understands from the merchant's IPN endpoint.
///
/// Anything but `00` and `02` makes the gateway retry the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpnCode {
    Success,
    OrderNotFound,
    AlreadyConfirmed,
    InvalidAmount,
    InvalidSignature,
    Unknown,
}

impl IpnCode {
    pub fn code(self) -> &'static str {
        match self {
            IpnCode::Success => "00",
            IpnCode::OrderNotFound => "01",
            IpnCode::AlreadyConfirmed => "02",
            IpnCode::InvalidAmount => "04",
            IpnCode::InvalidSignature => "97",
            IpnCode::Unknown => "99",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            IpnCode::Success => "Confirm Success",
            IpnCode::OrderNotFound => "Order not found",
            IpnCode::AlreadyConfirmed => "Order already confirmed",
            IpnCode::InvalidAmount => "Invalid amount",
            IpnCode::InvalidSignature => "Invalid signature",
            IpnCode::Unknown => "Unknown error",
        }
    }

    pub fn response(self) -> IpnResponse {
        IpnResponse::new(self.code(), self.message())
    }
}

impl From<IpnCode> for IpnResponse {
    fn from(code: IpnCode) -> Self {
        code.response()
    }
}
