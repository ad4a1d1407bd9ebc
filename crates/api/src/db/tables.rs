use sea_query::Iden;

#[derive(Iden)]
pub enum Orders {
    Table,
    Id,
    PaymentIntentId,
    PaymentStatus,
    FulfillmentStatus,
    CustomerName,
    CustomerEmail,
    AmountCents,
    DiscountCents,
    ShippingLine1,
    ShippingLine2,
    ShippingCity,
    ShippingState,
    ShippingPostalCode,
    ShippingCountry,
    TeamName,
    PlaqueName,
    ConfirmationEmailSent,
    ConfirmationEmailSentAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum OrderStatusHistory {
    Table,
    Id,
    OrderId,
    StatusType,
    OldStatus,
    NewStatus,
    Actor,
    Note,
    CreatedAt,
}
