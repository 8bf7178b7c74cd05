use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersDto {
    pub pedidos: Vec<OrderDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDto {
    pub id: u64,
    pub produto: String,
    pub quantidade: i64,

    /// `%Y-%m-%d %H:%M:%S`
    pub inicio_jornada: String,

    /// `%Y-%m-%d %H:%M:%S`
    pub fim_jornada: String,

    /// Activity ids in dependency order.
    pub atividades: Vec<u64>,
}
