//! gRPC implementation of `UserService`: record management over the shared
//! [`RecordStore`].

use crate::server::{
    store::RecordStore,
    telemetry::{increment_requests, increment_users_created},
};
use greeter_tonic_core::proto::{
    CreateUsersRequest, CreateUsersResponse, DeleteUserRequest, GetUserRequest, ListUsersRequest,
    ListUsersResponse, User, user_service_server::UserService,
};
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct RecordService {
    store: RecordStore,
}

impl RecordService {
    pub const fn new(store: RecordStore) -> Self {
        Self { store }
    }
}

#[tonic::async_trait]
impl UserService for RecordService {
    /// Stores every input under its derived key and echoes the stored records
    /// back in input order. A later input with the same key overwrites an
    /// earlier one, so the store holds the last of any duplicates.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(count = req.get_ref().users.len())))]
    async fn create_users(
        &self,
        req: Request<CreateUsersRequest>,
    ) -> Result<Response<CreateUsersResponse>, Status> {
        increment_requests("CreateUsers");

        let inputs = req.into_inner().users;
        let mut users = Vec::with_capacity(inputs.len());
        for input in inputs {
            let user = User::from(input);
            self.store.put(user.name.clone(), user.clone());
            users.push(user);
        }

        increment_users_created(users.len() as u64);
        Ok(Response::new(CreateUsersResponse { users }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn list_users(
        &self,
        _req: Request<ListUsersRequest>,
    ) -> Result<Response<ListUsersResponse>, Status> {
        increment_requests("ListUsers");
        Ok(Response::new(ListUsersResponse {
            users: self.store.get_all(),
        }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(name = %req.get_ref().name)))]
    async fn get_user(&self, req: Request<GetUserRequest>) -> Result<Response<User>, Status> {
        increment_requests("GetUser");
        Ok(Response::new(self.store.get(&req.get_ref().name)?))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(name = %req.get_ref().name)))]
    async fn delete_user(&self, req: Request<DeleteUserRequest>) -> Result<Response<()>, Status> {
        increment_requests("DeleteUser");
        self.store.delete(&req.get_ref().name);
        Ok(Response::new(()))
    }
}
