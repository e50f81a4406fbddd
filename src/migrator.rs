use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_warehouses_table::Migration),
            Box::new(m20240101_000002_create_warehouse_locations_table::Migration),
            Box::new(m20240101_000003_create_parts_table::Migration),
            Box::new(m20240101_000004_create_part_locations_table::Migration),
            Box::new(m20240101_000005_create_current_inventory_table::Migration),
            Box::new(m20240101_000006_create_inventory_transactions_table::Migration),
            Box::new(m20240101_000007_create_stock_counts_table::Migration),
            Box::new(m20240101_000008_create_stock_count_details_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_warehouses_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_warehouses_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Warehouses::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Warehouses::Code)
                                .string_len(20)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Warehouses::Name).string_len(100).not_null())
                        .col(ColumnDef::new(Warehouses::Description).text().null())
                        .col(
                            ColumnDef::new(Warehouses::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Warehouses::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Warehouses {
        Table,
        Id,
        Code,
        Name,
        Description,
        IsActive,
        CreatedAt,
    }
}

mod m20240101_000002_create_warehouse_locations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_warehouse_locations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WarehouseLocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WarehouseLocations::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(WarehouseLocations::WarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarehouseLocations::LocationCode)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(ColumnDef::new(WarehouseLocations::Description).text().null())
                        .col(
                            ColumnDef::new(WarehouseLocations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_warehouse_locations_warehouse")
                                .from(WarehouseLocations::Table, WarehouseLocations::WarehouseId)
                                .to(Warehouses::Table, Warehouses::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // A location code is unique within its warehouse
            manager
                .create_index(
                    Index::create()
                        .name("idx_warehouse_locations_warehouse_code")
                        .table(WarehouseLocations::Table)
                        .col(WarehouseLocations::WarehouseId)
                        .col(WarehouseLocations::LocationCode)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WarehouseLocations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WarehouseLocations {
        Table,
        Id,
        WarehouseId,
        LocationCode,
        Description,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Warehouses {
        Table,
        Id,
    }
}

mod m20240101_000003_create_parts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_parts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Parts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Parts::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Parts::Code)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Parts::Name).string_len(200).not_null())
                        .col(ColumnDef::new(Parts::Description).text().null())
                        .col(ColumnDef::new(Parts::Unit).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Parts::QuantityPerBox)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Parts::SafetyStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parts::ReorderPoint)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parts::StandardCost)
                                .decimal_len(10, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Parts::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Parts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Parts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_parts_name")
                        .table(Parts::Table)
                        .col(Parts::Name)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Parts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Parts {
        Table,
        Id,
        Code,
        Name,
        Description,
        Unit,
        QuantityPerBox,
        SafetyStock,
        ReorderPoint,
        StandardCost,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_part_locations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_part_locations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PartLocations::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(PartLocations::PartId).integer().not_null())
                        .col(ColumnDef::new(PartLocations::LocationId).integer().not_null())
                        .primary_key(
                            Index::create()
                                .col(PartLocations::PartId)
                                .col(PartLocations::LocationId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_part_locations_part")
                                .from(PartLocations::Table, PartLocations::PartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_part_locations_location")
                                .from(PartLocations::Table, PartLocations::LocationId)
                                .to(WarehouseLocations::Table, WarehouseLocations::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_part_locations_location")
                        .table(PartLocations::Table)
                        .col(PartLocations::LocationId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PartLocations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PartLocations {
        Table,
        PartId,
        LocationId,
    }

    #[derive(DeriveIden)]
    enum Parts {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum WarehouseLocations {
        Table,
        Id,
    }
}

mod m20240101_000005_create_current_inventory_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_current_inventory_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CurrentInventory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CurrentInventory::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CurrentInventory::PartId).integer().not_null())
                        .col(
                            ColumnDef::new(CurrentInventory::WarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CurrentInventory::QuantityOnHand)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CurrentInventory::ReservedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CurrentInventory::AvailableQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CurrentInventory::LastUpdated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_current_inventory_part")
                                .from(CurrentInventory::Table, CurrentInventory::PartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_current_inventory_warehouse")
                                .from(CurrentInventory::Table, CurrentInventory::WarehouseId)
                                .to(Warehouses::Table, Warehouses::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One balance row per part and warehouse
            manager
                .create_index(
                    Index::create()
                        .name("idx_current_inventory_part_warehouse")
                        .table(CurrentInventory::Table)
                        .col(CurrentInventory::PartId)
                        .col(CurrentInventory::WarehouseId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CurrentInventory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CurrentInventory {
        Table,
        Id,
        PartId,
        WarehouseId,
        QuantityOnHand,
        ReservedQuantity,
        AvailableQuantity,
        LastUpdated,
    }

    #[derive(DeriveIden)]
    enum Parts {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Warehouses {
        Table,
        Id,
    }
}

mod m20240101_000006_create_inventory_transactions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_inventory_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransactions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::PartId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::WarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::TransactionType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceType)
                                .string_len(20)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceId)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::UnitCost)
                                .decimal_len(10, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(InventoryTransactions::Notes).text().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedBy)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::TransactionDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_transactions_part")
                                .from(InventoryTransactions::Table, InventoryTransactions::PartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_transactions_warehouse")
                                .from(
                                    InventoryTransactions::Table,
                                    InventoryTransactions::WarehouseId,
                                )
                                .to(Warehouses::Table, Warehouses::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_part_warehouse_date")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::PartId)
                        .col(InventoryTransactions::WarehouseId)
                        .col(InventoryTransactions::TransactionDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryTransactions {
        Table,
        Id,
        PartId,
        WarehouseId,
        TransactionType,
        Quantity,
        ReferenceType,
        ReferenceId,
        UnitCost,
        Notes,
        CreatedBy,
        TransactionDate,
    }

    #[derive(DeriveIden)]
    enum Parts {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Warehouses {
        Table,
        Id,
    }
}

mod m20240101_000007_create_stock_counts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_stock_counts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockCounts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockCounts::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockCounts::CountNumber)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(StockCounts::WarehouseId).integer().not_null())
                        .col(
                            ColumnDef::new(StockCounts::CountDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCounts::Status)
                                .string_len(20)
                                .not_null()
                                .default("planning"),
                        )
                        .col(
                            ColumnDef::new(StockCounts::CountType)
                                .string_len(20)
                                .not_null()
                                .default("full"),
                        )
                        .col(ColumnDef::new(StockCounts::Description).text().null())
                        .col(ColumnDef::new(StockCounts::CountedBy).string_len(100).null())
                        .col(ColumnDef::new(StockCounts::VerifiedBy).string_len(100).null())
                        .col(
                            ColumnDef::new(StockCounts::TotalItems)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockCounts::VarianceItems)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockCounts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCounts::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_counts_warehouse")
                                .from(StockCounts::Table, StockCounts::WarehouseId)
                                .to(Warehouses::Table, Warehouses::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_counts_status")
                        .table(StockCounts::Table)
                        .col(StockCounts::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockCounts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockCounts {
        Table,
        Id,
        CountNumber,
        WarehouseId,
        CountDate,
        Status,
        CountType,
        Description,
        CountedBy,
        VerifiedBy,
        TotalItems,
        VarianceItems,
        CreatedAt,
        CompletedAt,
    }

    #[derive(DeriveIden)]
    enum Warehouses {
        Table,
        Id,
    }
}

mod m20240101_000008_create_stock_count_details_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000008_create_stock_count_details_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockCountDetails::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockCountDetails::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockCountDetails::StockCountId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockCountDetails::PartId).integer().not_null())
                        .col(
                            ColumnDef::new(StockCountDetails::SystemQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockCountDetails::CountedQuantity)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockCountDetails::VarianceQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockCountDetails::Notes).text().null())
                        .col(
                            ColumnDef::new(StockCountDetails::CountedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_count_details_count")
                                .from(StockCountDetails::Table, StockCountDetails::StockCountId)
                                .to(StockCounts::Table, StockCounts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_count_details_part")
                                .from(StockCountDetails::Table, StockCountDetails::PartId)
                                .to(Parts::Table, Parts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One detail row per part within a count
            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_count_details_count_part")
                        .table(StockCountDetails::Table)
                        .col(StockCountDetails::StockCountId)
                        .col(StockCountDetails::PartId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockCountDetails::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockCountDetails {
        Table,
        Id,
        StockCountId,
        PartId,
        SystemQuantity,
        CountedQuantity,
        VarianceQuantity,
        Notes,
        CountedAt,
    }

    #[derive(DeriveIden)]
    enum StockCounts {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Parts {
        Table,
        Id,
    }
}
