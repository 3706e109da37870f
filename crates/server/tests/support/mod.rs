//! Shared test harness: in-memory store, scripted gateway, seed helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use zentro_core::{CurrencyCode, OwnerKey};
use zentro_server::gateway::{
    CheckoutSession, CustomerInfo, GatewayError, Gateways, PaymentGateway, VerifiedTransaction,
};
use zentro_server::models::{NewAddress, NewProduct, Product};
use zentro_server::services::checkout::CheckoutService;
use zentro_server::services::reconcile::Reconciler;
use zentro_server::store::{CommerceStore, MemoryStore};

/// One scripted answer for a `verify` call.
pub enum MockVerify {
    Ok(VerifiedTransaction),
    Unreachable,
    ApiError,
}

/// A gateway whose `verify` answers follow a script, falling back to a fixed
/// response once the script is exhausted (so duplicate deliveries see the
/// same gateway record, as they would in production).
#[derive(Default)]
pub struct MockGateway {
    script: Mutex<VecDeque<MockVerify>>,
    fallback: Mutex<Option<VerifiedTransaction>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one scripted verify answer.
    pub async fn push(&self, answer: MockVerify) {
        self.script.lock().await.push_back(answer);
    }

    /// Set the answer used when the script is empty.
    pub async fn set_fallback(&self, verified: VerifiedTransaction) {
        *self.fallback.lock().await = Some(verified);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate(
        &self,
        reference: &str,
        _amount: Decimal,
        _currency: CurrencyCode,
        _customer: &CustomerInfo,
    ) -> Result<CheckoutSession, GatewayError> {
        Ok(CheckoutSession {
            checkout_link: Some(format!("https://checkout.test/{reference}")),
            access_code: Some("ACCESS".to_owned()),
        })
    }

    async fn verify(
        &self,
        _reference: &str,
        _transaction_id: Option<&str>,
    ) -> Result<VerifiedTransaction, GatewayError> {
        if let Some(answer) = self.script.lock().await.pop_front() {
            return match answer {
                MockVerify::Ok(verified) => Ok(verified),
                MockVerify::Unreachable => {
                    Err(GatewayError::Unreachable("connection timed out".to_owned()))
                }
                MockVerify::ApiError => Err(GatewayError::Api {
                    status: 400,
                    message: "verification endpoint reported failure".to_owned(),
                }),
            };
        }
        self.fallback
            .lock()
            .await
            .clone()
            .ok_or_else(|| GatewayError::Api {
                status: 404,
                message: "no scripted response".to_owned(),
            })
    }
}

/// Everything a test needs, wired over one in-memory store.
pub struct Harness {
    pub store: Arc<dyn CommerceStore>,
    pub gateway: Arc<MockGateway>,
    pub checkout: CheckoutService,
    pub reconciler: Reconciler,
}

pub fn harness() -> Harness {
    let store: Arc<dyn CommerceStore> = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::new());
    let gateways = Gateways {
        flutterwave: gateway.clone(),
        paystack: gateway.clone(),
    };
    Harness {
        checkout: CheckoutService::new(Arc::clone(&store), gateways.clone()),
        reconciler: Reconciler::new(Arc::clone(&store), gateways),
        store,
        gateway,
    }
}

pub fn session_owner(token: &str) -> OwnerKey {
    OwnerKey::Anonymous(token.to_owned())
}

pub async fn seed_product(
    store: &Arc<dyn CommerceStore>,
    title: &str,
    price: &str,
) -> Product {
    store
        .create_product(NewProduct {
            title: title.to_owned(),
            price: price.parse().expect("valid decimal"),
            image: Some("https://img.test/p.jpg".to_owned()),
            category: None,
            description: None,
        })
        .await
        .expect("product created")
}

/// Give the owner a selected shipping address (the first address is
/// auto-selected and auto-defaulted).
pub async fn seed_selected_address(store: &Arc<dyn CommerceStore>, owner: &OwnerKey) {
    let profile = store
        .get_or_create_profile(owner)
        .await
        .expect("profile created");
    store
        .add_address(
            profile.id,
            NewAddress {
                name: Some("Ada Obi".to_owned()),
                phone: Some("+2348000000000".to_owned()),
                city: Some("Lagos".to_owned()),
                state: Some("Lagos".to_owned()),
                address: Some("12 Marina Road".to_owned()),
                zip_code: Some("100001".to_owned()),
                country: Some("Nigeria".to_owned()),
                email: Some("ada@example.com".to_owned()),
            },
            false,
        )
        .await
        .expect("address added");
}

/// A verified-success record matching `amount` NGN with gateway id `id`.
pub fn verified(amount: &str, id: &str) -> VerifiedTransaction {
    VerifiedTransaction {
        succeeded: true,
        amount: amount.parse().expect("valid decimal"),
        currency: CurrencyCode::NGN,
        external_transaction_id: id.to_owned(),
    }
}
