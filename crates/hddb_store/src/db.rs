use sea_orm::DeriveIden;

#[derive(DeriveIden, Clone, Copy)]
pub enum HdDatabase {
    Table,
    Id,
    Username,
    Slug,
    CreatedAt,
    UpdatedAt,
    NTables,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum HdTables {
    Table,
    Id,
    Label,
    Nrow,
    Ncol,
}

#[derive(DeriveIden, Clone, Copy)]
pub enum HdFields {
    Table,
    FieldId,
    Id,
    Label,
    #[sea_orm(iden = "table")]
    OwnerTable,
    Type,
}
