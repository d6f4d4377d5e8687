mod test_api;
mod test_deployer;
mod test_fsm;
mod test_router;
mod test_services;
