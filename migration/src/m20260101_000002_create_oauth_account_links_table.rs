use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthAccountLinks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthAccountLinks::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthAccountLinks::Provider)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAccountLinks::ExternalAccountId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAccountLinks::OwnerId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthAccountLinks::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一外部账户只能归属一个本地实体
        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_account_links_provider_account")
                    .table(OAuthAccountLinks::Table)
                    .col(OAuthAccountLinks::Provider)
                    .col(OAuthAccountLinks::ExternalAccountId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OAuthAccountLinks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OAuthAccountLinks {
    #[sea_orm(iden = "oauth_account_links")]
    Table,
    Id,
    Provider,
    ExternalAccountId,
    OwnerId,
    CreatedAt,
}
