use serde::Serialize;

/// One row of the exported equipment agenda.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgendaRowDto {
    pub equipamento_id: u64,
    pub equipamento: String,
    pub categoria: String,
    pub pedido: u64,
    pub atividade: u64,
    pub quantidade: i64,
    pub inicio: String,
    pub fim: String,
}
