use satnet_bpa::storage::bundle_mem;

storage_tests::contract_tests!((bundle_mem::new(&bundle_mem::Config::default()), ()));
