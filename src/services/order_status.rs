use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;

/// Successor states reachable from `from`. Terminal states have none.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        OrderStatus::Pending => &[OrderStatus::Confirmed, OrderStatus::Cancelled],
        OrderStatus::Confirmed => &[OrderStatus::Shipped, OrderStatus::Cancelled],
        OrderStatus::Shipped => &[OrderStatus::Delivered, OrderStatus::Cancelled],
        OrderStatus::Delivered | OrderStatus::Cancelled => &[],
    }
}

pub fn is_terminal(status: OrderStatus) -> bool {
    allowed_transitions(status).is_empty()
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Parses a client supplied status; `canceled` is accepted as an alias.
pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    let normalized = raw.trim();
    if normalized.eq_ignore_ascii_case("canceled") {
        return Ok(OrderStatus::Cancelled);
    }
    normalized
        .parse::<OrderStatus>()
        .map_err(|_| ServiceError::ValidationError(format!("Unknown order status: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Confirmed, true)]
    #[case(OrderStatus::Pending, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Confirmed, OrderStatus::Shipped, true)]
    #[case(OrderStatus::Confirmed, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Delivered, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Pending, OrderStatus::Shipped, false)]
    #[case(OrderStatus::Pending, OrderStatus::Pending, false)]
    #[case(OrderStatus::Delivered, OrderStatus::Pending, false)]
    #[case(OrderStatus::Delivered, OrderStatus::Cancelled, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Pending, false)]
    #[case(OrderStatus::Shipped, OrderStatus::Confirmed, false)]
    fn transition_table(#[case] from: OrderStatus, #[case] to: OrderStatus, #[case] ok: bool) {
        assert_eq!(can_transition(from, to), ok);
    }

    #[test]
    fn delivered_and_cancelled_are_terminal() {
        assert!(is_terminal(OrderStatus::Delivered));
        assert!(is_terminal(OrderStatus::Cancelled));
        assert!(!is_terminal(OrderStatus::Shipped));
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = validate_transition(OrderStatus::Delivered, OrderStatus::Pending).unwrap_err();
        assert_matches!(
            err,
            ServiceError::InvalidTransition { ref from, ref to } if from == "delivered" && to == "pending"
        );
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(parse_status("Shipped").unwrap(), OrderStatus::Shipped);
        assert_eq!(parse_status("canceled").unwrap(), OrderStatus::Cancelled);
        assert_matches!(parse_status("refunded"), Err(ServiceError::ValidationError(_)));
    }
}
