use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    catalog::{shipping_cost, total_boxes, CartItem, Catalog},
    database::{Order, OrderItem},
    error::AppError,
    shipping::{find_available_week, reserve_week},
    state::AppState,
    stripe::WebhookEvent,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub cart: Option<Vec<CartItem>>,
    pub customer_email: Option<String>,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

pub async fn create_checkout_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let cart = payload
        .cart
        .filter(|cart| !cart.is_empty())
        .ok_or(AppError::MalformedPayload("Missing or empty cart"))?;
    let email = payload
        .customer_email
        .filter(|email| !email.trim().is_empty())
        .ok_or(AppError::MalformedPayload("Missing customer email"))?;

    let fee = shipping_cost(&cart, &state.catalog, state.config.shipping_fee);
    let params = checkout_params(&cart, &state.catalog, &email, fee, &state.config.site_url)?;

    let session = state.stripe.create_checkout_session(&params).await?;
    info!("Created checkout session {} for {email}", session.id);

    Ok(Json(CheckoutResponse { url: session.url }))
}

#[derive(Deserialize)]
pub struct ShippingInfoRequest {
    pub cart: Option<Vec<CartItem>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfoResponse {
    pub remaining_slots: u32,
    pub ship_date: NaiveDate,
    pub shipping_cost: f64,
}

pub async fn shipping_info_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ShippingInfoRequest>,
) -> Result<Json<ShippingInfoResponse>, AppError> {
    let cart = payload
        .cart
        .filter(|cart| !cart.is_empty())
        .ok_or(AppError::MalformedPayload("Missing or invalid cart payload"))?;
    let boxes = total_boxes(&cart);
    if boxes == 0 {
        return Err(AppError::MalformedPayload("Cart holds no boxes"));
    }

    let quote = find_available_week(
        &state.database,
        Local::now().naive_local(),
        boxes,
        &state.config,
    )
    .await?;

    Ok(Json(ShippingInfoResponse {
        remaining_slots: quote.remaining_slots,
        ship_date: quote.ship_date,
        shipping_cost: shipping_cost(&cart, &state.catalog, state.config.shipping_fee),
    }))
}

#[derive(Deserialize)]
pub struct PromoRequest {
    pub code: Option<String>,
}

#[derive(Serialize)]
pub struct PromoResponse {
    pub code: String,
    pub percent_off: Option<f64>,
}

pub async fn validate_promo_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PromoRequest>,
) -> Result<Json<PromoResponse>, AppError> {
    let code = payload
        .code
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .ok_or(AppError::MalformedPayload("Missing promo code"))?;

    match state.stripe.find_promotion_code(&code).await? {
        Some(promo) => Ok(Json(PromoResponse {
            code: promo.code,
            percent_off: promo.coupon.percent_off,
        })),
        None => Err(AppError::PromoNotFound),
    }
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

pub async fn payment_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;
    state.stripe.verify_webhook_signature(&body, signature)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|_| AppError::MalformedPayload("Malformed event body"))?;
    if event.kind != "checkout.session.completed" {
        return Ok(Json(WebhookAck { received: true }));
    }

    let session = event.data.object;
    let cart: Vec<CartItem> = match session.metadata.get("cart") {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|_| AppError::MalformedPayload("Malformed cart metadata"))?,
        None => Vec::new(),
    };

    let boxes = total_boxes(&cart);
    if boxes == 0 {
        warn!("Completed session {} carries no boxes, nothing to book", session.id);
        return Ok(Json(WebhookAck { received: true }));
    }

    let ship_date = reserve_week(
        &state.database,
        Local::now().naive_local(),
        boxes,
        &state.config,
    )
    .await?;

    let order = Order {
        session_id: session.id,
        customer_email: session
            .customer_details
            .and_then(|details| details.email)
            .unwrap_or_default(),
        amount_total: session.amount_total.unwrap_or(0) as f64 / 100.0,
        currency: session.currency.unwrap_or_else(|| "eur".to_string()),
        status: "paid".to_string(),
        ship_date,
        items: cart
            .iter()
            .map(|item| OrderItem {
                description: display_name(item),
                quantity: item.quantity,
                amount_total: state
                    .catalog
                    .find(&item.name)
                    .map(|product| product.price * item.quantity as f64)
                    .unwrap_or(0.0),
            })
            .collect(),
        created_at: Utc::now(),
    };
    state.database.record_order(&order).await?;

    info!(
        "Payment confirmed for session {}, {boxes} boxes booked for {ship_date}",
        order.session_id
    );

    Ok(Json(WebhookAck { received: true }))
}

fn display_name(item: &CartItem) -> String {
    match &item.option {
        Some(option) => format!("{} ({option})", item.name),
        None => item.name.clone(),
    }
}

fn cents(price: f64) -> String {
    ((price * 100.0).round() as i64).to_string()
}

/// Form parameters for Stripe's checkout session endpoint. Prices come from
/// the server-side catalog, never from the client; shipping is appended as
/// its own line item when it is not free.
fn checkout_params(
    cart: &[CartItem],
    catalog: &Catalog,
    email: &str,
    shipping_fee: f64,
    site_url: &str,
) -> Result<Vec<(String, String)>, AppError> {
    let metadata = serde_json::to_string(cart).map_err(|e| AppError::Internal(e.to_string()))?;

    let mut params: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("customer_email".into(), email.into()),
        ("payment_method_types[0]".into(), "card".into()),
        ("payment_method_types[1]".into(), "paypal".into()),
        ("allow_promotion_codes".into(), "true".into()),
        (
            "shipping_address_collection[allowed_countries][0]".into(),
            "IT".into(),
        ),
        (
            "success_url".into(),
            format!("{site_url}/success.html?session_id={{CHECKOUT_SESSION_ID}}"),
        ),
        ("cancel_url".into(), format!("{site_url}/cancel.html")),
        ("metadata[cart]".into(), metadata),
    ];

    for (index, item) in cart.iter().enumerate() {
        let product = catalog
            .find(&item.name)
            .ok_or_else(|| AppError::UnknownProduct(item.name.clone()))?;

        params.push((
            format!("line_items[{index}][price_data][currency]"),
            "eur".into(),
        ));
        params.push((
            format!("line_items[{index}][price_data][product_data][name]"),
            display_name(item),
        ));
        params.push((
            format!("line_items[{index}][price_data][unit_amount]"),
            cents(product.price),
        ));
        params.push((format!("line_items[{index}][quantity]"), item.quantity.to_string()));
    }

    if shipping_fee > 0.0 {
        let index = cart.len();
        params.push((
            format!("line_items[{index}][price_data][currency]"),
            "eur".into(),
        ));
        params.push((
            format!("line_items[{index}][price_data][product_data][name]"),
            "Standard Shipping".into(),
        ));
        params.push((
            format!("line_items[{index}][price_data][unit_amount]"),
            cents(shipping_fee),
        ));
        params.push((format!("line_items[{index}][quantity]"), "1".into()));
    }

    Ok(params)
}
