pub mod complaint;
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod product;
pub mod review;
pub mod review_vote;
pub mod seller_verification;
pub mod shop;
pub mod user;

pub use complaint::Entity as Complaint;
pub use coupon::Entity as Coupon;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
pub use review::Entity as Review;
pub use review_vote::Entity as ReviewVote;
pub use seller_verification::Entity as SellerVerification;
pub use shop::Entity as Shop;
pub use user::Entity as User;
