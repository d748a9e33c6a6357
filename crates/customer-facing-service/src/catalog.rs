//! 商品目录
//!
//! 模拟购买时从固定目录中随机挑选商品。

use rand::seq::IndexedRandom;
use serde::Serialize;

/// 目录中的商品
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CatalogItem {
    pub name: &'static str,
    pub price: f64,
}

const fn item(name: &'static str, price: f64) -> CatalogItem {
    CatalogItem { name, price }
}

/// 可购买的商品列表
pub const RANDOM_ITEMS: [CatalogItem; 15] = [
    item("Laptop", 999.99),
    item("Smartphone", 699.99),
    item("Headphones", 199.99),
    item("Keyboard", 89.99),
    item("Mouse", 49.99),
    item("Monitor", 349.99),
    item("Tablet", 499.99),
    item("Smartwatch", 299.99),
    item("Camera", 799.99),
    item("Speaker", 149.99),
    item("USB Cable", 19.99),
    item("External SSD", 129.99),
    item("Webcam", 79.99),
    item("Gaming Console", 499.99),
    item("Router", 159.99),
];

/// 随机挑选一件商品
pub fn random_item() -> CatalogItem {
    RANDOM_ITEMS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(RANDOM_ITEMS[0])
}
