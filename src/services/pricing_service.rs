use thiserror::Error;

use crate::models::catalog_item::BookableItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub unit_price: i64,
    pub total_amount: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("The selected city is not available for booking")]
    CityNotBookable,
    /// `max` is absent for items without a group-size cap.
    #[error("{}", member_count_message(.max))]
    InvalidMemberCount { max: Option<u32> },
}

fn member_count_message(max: &Option<u32>) -> String {
    match max {
        Some(max) => format!("Member count must be between 1 and {}", max),
        None => "At least one member is required".to_string(),
    }
}

pub struct PricingService;

impl PricingService {
    /// Resolve the authoritative price for an item/city/member-count choice.
    ///
    /// The unit price is the discount price when one is present and positive,
    /// otherwise the regular price. Amounts are integer minor currency units,
    /// so the total is an exact multiplication with no rounding.
    pub fn resolve(item: &BookableItem, city: &str, members: u32) -> Result<Quote, PricingError> {
        let cap = (item.max_group_size > 0).then_some(item.max_group_size);
        if members < 1 {
            return Err(PricingError::InvalidMemberCount { max: cap });
        }
        if cap.is_some_and(|cap| members > cap) {
            return Err(PricingError::InvalidMemberCount { max: cap });
        }

        let entry = item.pricing_for(city).ok_or(PricingError::CityNotBookable)?;
        if entry.price <= 0 {
            return Err(PricingError::CityNotBookable);
        }

        let unit_price = match entry.discount_price {
            Some(discount) if discount > 0 => discount,
            _ => entry.price,
        };

        Ok(Quote {
            unit_price,
            total_amount: unit_price * i64::from(members),
        })
    }
}
