use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_customers_table::Migration),
            Box::new(m20240301_000002_create_users_table::Migration),
            Box::new(m20240301_000003_create_user_roles_table::Migration),
            Box::new(m20240301_000004_create_foods_table::Migration),
            Box::new(m20240301_000005_create_orders_table::Migration),
            Box::new(m20240301_000006_create_order_lines_table::Migration),
            Box::new(m20240301_000007_create_menus_table::Migration),
            Box::new(m20240301_000008_create_menu_grants_table::Migration),
        ]
    }
}

mod m20240301_000001_create_customers_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_customers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Customers::Name).string_len(100).not_null())
                        .col(
                            ColumnDef::new(Customers::Email)
                                .string_len(256)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Customers::PhoneNumber).string_len(20).null())
                        .col(ColumnDef::new(Customers::Address).string_len(500).null())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Customers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Customers {
        Table,
        Id,
        Name,
        Email,
        PhoneNumber,
        Address,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_users_table {
    use super::m20240301_000001_create_customers_table::Customers;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Users::Email)
                                .string_len(256)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::FirstName).string_len(100).null())
                        .col(ColumnDef::new(Users::LastName).string_len(100).null())
                        .col(ColumnDef::new(Users::PhoneNumber).string_len(20).null())
                        .col(ColumnDef::new(Users::Address).string_len(500).null())
                        .col(ColumnDef::new(Users::CustomerId).integer().null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_users_customer_id")
                                .from(Users::Table, Users::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Users {
        Table,
        Id,
        Email,
        FirstName,
        LastName,
        PhoneNumber,
        Address,
        CustomerId,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_user_roles_table {
    use super::m20240301_000002_create_users_table::Users;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_user_roles_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(UserRoles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(UserRoles::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(UserRoles::UserId).uuid().not_null())
                        .col(ColumnDef::new(UserRoles::RoleName).string_len(32).not_null())
                        .col(
                            ColumnDef::new(UserRoles::AssignedDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserRoles::AssignedBy).string_len(256).null())
                        .col(
                            ColumnDef::new(UserRoles::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_user_roles_user_id")
                                .from(UserRoles::Table, UserRoles::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_user_roles_user_role")
                        .table(UserRoles::Table)
                        .col(UserRoles::UserId)
                        .col(UserRoles::RoleName)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UserRoles::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum UserRoles {
        Table,
        Id,
        UserId,
        RoleName,
        AssignedDate,
        AssignedBy,
        IsActive,
    }
}

mod m20240301_000004_create_foods_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_foods_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Foods::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Foods::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Foods::Name).string_len(100).not_null())
                        .col(ColumnDef::new(Foods::Description).string_len(500).null())
                        .col(ColumnDef::new(Foods::Price).decimal_len(16, 2).not_null())
                        .col(ColumnDef::new(Foods::Category).string_len(200).null())
                        .col(ColumnDef::new(Foods::ImageUrl).string_len(500).null())
                        .col(
                            ColumnDef::new(Foods::IsAvailable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Foods::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Foods::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_foods_category")
                        .table(Foods::Table)
                        .col(Foods::Category)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Foods::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Foods {
        Table,
        Id,
        Name,
        Description,
        Price,
        Category,
        ImageUrl,
        IsAvailable,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000005_create_orders_table {
    use super::m20240301_000001_create_customers_table::Customers;
    use super::m20240301_000002_create_users_table::Users;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Orders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(ColumnDef::new(Orders::CustomerId).integer().null())
                        .col(
                            ColumnDef::new(Orders::OrderDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::Status)
                                .string_len(32)
                                .not_null()
                                .default("Pending"),
                        )
                        .col(ColumnDef::new(Orders::DeliveryAddress).string_len(500).null())
                        .col(ColumnDef::new(Orders::ContactNumber).string_len(15).null())
                        .col(
                            ColumnDef::new(Orders::DeliveredDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_user_id")
                                .from(Orders::Table, Orders::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_customer_id")
                                .from(Orders::Table, Orders::CustomerId)
                                .to(Customers::Table, Customers::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_date")
                        .table(Orders::Table)
                        .col(Orders::OrderDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        UserId,
        CustomerId,
        OrderDate,
        TotalAmount,
        Status,
        DeliveryAddress,
        ContactNumber,
        DeliveredDate,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000006_create_order_lines_table {
    use super::m20240301_000004_create_foods_table::Foods;
    use super::m20240301_000005_create_orders_table::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_order_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Lines are removed explicitly by the order engine, never by cascade.
            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderLines::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderLines::OrderId).integer().not_null())
                        .col(ColumnDef::new(OrderLines::FoodId).integer().not_null())
                        .col(ColumnDef::new(OrderLines::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderLines::UnitPrice)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLines::LineTotal)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_order_id")
                                .from(OrderLines::Table, OrderLines::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_food_id")
                                .from(OrderLines::Table, OrderLines::FoodId)
                                .to(Foods::Table, Foods::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_lines_order_id")
                        .table(OrderLines::Table)
                        .col(OrderLines::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_lines_food_id")
                        .table(OrderLines::Table)
                        .col(OrderLines::FoodId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderLines {
        Table,
        Id,
        OrderId,
        FoodId,
        Quantity,
        UnitPrice,
        LineTotal,
        CreatedAt,
    }
}

mod m20240301_000007_create_menus_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_menus_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Menus::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Menus::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Menus::Name).string_len(100).not_null())
                        .col(ColumnDef::new(Menus::Url).string_len(200).null())
                        .col(ColumnDef::new(Menus::IconClass).string_len(50).null())
                        .col(
                            ColumnDef::new(Menus::DisplayOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Menus::ParentMenuId).integer().null())
                        .col(
                            ColumnDef::new(Menus::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Menus::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_menus_parent_menu_id")
                                .from(Menus::Table, Menus::ParentMenuId)
                                .to(Menus::Table, Menus::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Menus::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Menus {
        Table,
        Id,
        Name,
        Url,
        IconClass,
        DisplayOrder,
        ParentMenuId,
        IsActive,
        CreatedAt,
    }
}

mod m20240301_000008_create_menu_grants_table {
    use super::m20240301_000002_create_users_table::Users;
    use super::m20240301_000007_create_menus_table::Menus;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000008_create_menu_grants_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MenuGrants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MenuGrants::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(MenuGrants::UserId).uuid().not_null())
                        .col(ColumnDef::new(MenuGrants::MenuId).integer().not_null())
                        .col(
                            ColumnDef::new(MenuGrants::AssignedDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MenuGrants::AssignedBy).string_len(256).null())
                        .col(
                            ColumnDef::new(MenuGrants::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_menu_grants_user_id")
                                .from(MenuGrants::Table, MenuGrants::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_menu_grants_menu_id")
                                .from(MenuGrants::Table, MenuGrants::MenuId)
                                .to(Menus::Table, Menus::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_menu_grants_user_menu")
                        .table(MenuGrants::Table)
                        .col(MenuGrants::UserId)
                        .col(MenuGrants::MenuId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MenuGrants::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MenuGrants {
        Table,
        Id,
        UserId,
        MenuId,
        AssignedDate,
        AssignedBy,
        IsActive,
    }
}
